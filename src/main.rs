use clap::Parser;
use mulheres_politica::config::cli::{CliArgs, Command};
use mulheres_politica::domain::ports::Pipeline;
use mulheres_politica::utils::error::{ErrorSeverity, EtlError, Result};
use mulheres_politica::utils::{logger, validation::Validate};
use mulheres_politica::{
    AppConfig, ConsolidatePipeline, CouncillorsPipeline, DeputiesPipeline, EtlEngine,
    LocalStorage, NormalizePipeline, Role, SenatorsPipeline,
};

#[derive(Debug, Clone, Copy)]
enum Job {
    Deputies,
    Senators,
    Councillors,
    Normalize(Role),
    Consolidate,
}

impl Job {
    fn for_command(command: &Command) -> Vec<Job> {
        match command {
            Command::Deputies => vec![Job::Deputies],
            Command::Senators => vec![Job::Senators],
            Command::Councillors => vec![Job::Councillors],
            Command::Normalize { role } => vec![Job::Normalize(*role)],
            Command::Consolidate => vec![Job::Consolidate],
            Command::All => vec![
                Job::Deputies,
                Job::Senators,
                Job::Councillors,
                Job::Normalize(Role::FederalDeputy),
                Job::Normalize(Role::FederalSenator),
                Job::Normalize(Role::MunicipalCouncilMember),
                Job::Consolidate,
            ],
        }
    }
}

async fn run_pipeline<P: Pipeline>(pipeline: P, monitor: bool) -> Result<String> {
    EtlEngine::new_with_monitoring(pipeline, monitor).run().await
}

async fn run_job(job: Job, config: &AppConfig, monitor: bool) -> Result<String> {
    let storage = LocalStorage::new(config.output.directory.clone());
    match job {
        Job::Deputies => run_pipeline(DeputiesPipeline::new(storage, config)?, monitor).await,
        Job::Senators => run_pipeline(SenatorsPipeline::new(storage, config)?, monitor).await,
        Job::Councillors => {
            run_pipeline(CouncillorsPipeline::new(storage, config)?, monitor).await
        }
        Job::Normalize(role) => {
            run_pipeline(NormalizePipeline::new(storage, role, config), monitor).await
        }
        Job::Consolidate => run_pipeline(ConsolidatePipeline::new(storage, config), monitor).await,
    }
}

fn report_failure(job: Job, e: &EtlError) {
    tracing::error!(
        "❌ {:?} failed: {} (Category: {:?}, Severity: {:?})",
        job,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Medium => 2,   // remote source problem, rerun later
        ErrorSeverity::High => 1,     // processing or configuration error
        ErrorSeverity::Critical => 3, // output could not be written
    }
}

/// Output that cannot be written ends the run; later jobs would fail the same way.
fn stops_run(severity: ErrorSeverity) -> bool {
    severity == ErrorSeverity::Critical
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    if args.log_json {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("Starting mulheres-politica");
    if args.verbose {
        tracing::debug!("CLI arguments: {:?}", args);
    }

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Could not load configuration: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if args.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let mut worst: Option<ErrorSeverity> = None;
    for job in Job::for_command(&args.command) {
        match run_job(job, &config, args.monitor).await {
            Ok(output_path) => {
                println!("✅ {:?} completed", job);
                println!("📁 Output saved to: {}", output_path);
            }
            Err(e) => {
                report_failure(job, &e);
                let severity = e.severity();
                worst = worst.max(Some(severity));
                if stops_run(severity) {
                    tracing::error!("⛔ Stopping after {:?}: output cannot be written", job);
                    break;
                }
            }
        }
    }

    if let Some(severity) = worst {
        std::process::exit(exit_code(severity));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_runs_collections_then_normalize_then_consolidate() {
        let jobs = Job::for_command(&Command::All);

        assert_eq!(jobs.len(), 7);
        assert!(matches!(jobs[0], Job::Deputies));
        assert!(matches!(jobs[3], Job::Normalize(Role::FederalDeputy)));
        assert!(matches!(jobs[5], Job::Normalize(Role::MunicipalCouncilMember)));
        assert!(matches!(jobs[6], Job::Consolidate));
    }

    #[test]
    fn test_only_storage_failures_stop_the_run() {
        let storage = EtlError::IoError(std::io::Error::other("disk full"));
        let network = EtlError::SourceUnavailable {
            url: "https://example.com".to_string(),
            attempts: 3,
            reason: "HTTP 503".to_string(),
        };

        assert!(stops_run(storage.severity()));
        assert!(!stops_run(network.severity()));
        assert!(!stops_run(ErrorSeverity::High));
    }

    #[test]
    fn test_exit_codes_follow_severity() {
        assert_eq!(exit_code(ErrorSeverity::High), 1);
        assert_eq!(exit_code(ErrorSeverity::Medium), 2);
        assert_eq!(exit_code(ErrorSeverity::Critical), 3);
    }
}
