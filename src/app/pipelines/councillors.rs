//! Elected female council members from the TSE open-data candidate archive.

use crate::app::pipelines::{today, write_outputs};
use crate::config::toml_config::{AppConfig, CouncillorsConfig};
use crate::core::archive::{extract_councillors, resolve_archive_url, ArchiveExtraction, ArchiveSettings};
use crate::core::flatfile::{to_pretty_json, write_csv};
use crate::core::http::PageFetcher;
use crate::core::municipalities::fetch_municipality_index;
use crate::core::stats::{distribution, log_top};
use crate::domain::model::{OutputFile, Role, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use std::time::Duration;

pub struct CouncillorsPipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) output_dir: String,
    config: CouncillorsConfig,
    fetcher: PageFetcher,
    downloader: PageFetcher,
    extracted_on: Option<String>,
}

impl<S: Storage> CouncillorsPipeline<S> {
    pub fn new(storage: S, config: &AppConfig) -> Result<Self> {
        let councillors = config.councillors.clone();
        let download_timeout = Duration::from_secs(councillors.download_timeout_seconds);

        Ok(Self {
            storage,
            output_dir: config.output.directory.clone(),
            fetcher: PageFetcher::new(&config.http)?,
            downloader: PageFetcher::with_timeout(&config.http, download_timeout)?,
            config: councillors,
            extracted_on: None,
        })
    }

    /// Fixes the `data_extracao` date instead of reading the clock.
    pub fn with_date(mut self, date: &str) -> Self {
        self.extracted_on = Some(date.to_string());
        self
    }

    /// Archive bytes and the URL recorded as their source.
    async fn archive(&self) -> Result<(Vec<u8>, String)> {
        if let Some(path) = &self.config.archive_path {
            tracing::info!("📦 Using local archive {}", path);
            let bytes = tokio::fs::read(path).await?;
            return Ok((bytes, self.config.archive_url.clone()));
        }

        let url = resolve_archive_url(&self.fetcher, &self.config).await?;
        tracing::info!("⬇️ Downloading {}", url);
        let bytes = self.downloader.fetch_bytes(&url).await.into_result(&url)?;
        tracing::info!("✓ Downloaded {:.1} MB", bytes.len() as f64 / 1_048_576.0);
        Ok((bytes, url))
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for CouncillorsPipeline<S> {
    type Extracted = ArchiveExtraction;

    fn name(&self) -> &str {
        "councillors"
    }

    async fn extract(&self) -> Result<ArchiveExtraction> {
        let (bytes, source_url) = self.archive().await?;

        let settings = ArchiveSettings {
            source_url,
            term: self.config.term.clone(),
            states: self.config.states.iter().map(|s| s.to_uppercase()).collect(),
            extracted_on: self.extracted_on.clone().unwrap_or_else(today),
        };

        let mut extraction =
            tokio::task::spawn_blocking(move || extract_councillors(&bytes, &settings))
                .await
                .map_err(|e| EtlError::ProcessingError {
                    message: format!("Archive extraction task failed: {}", e),
                })??;

        let municipalities_url = self
            .config
            .municipalities_url
            .as_deref()
            .filter(|url| !url.is_empty());
        if let Some(url) = municipalities_url {
            if !extraction.records.is_empty() {
                self.fetcher.pause().await;
                if let Some(index) = fetch_municipality_index(&self.fetcher, url).await {
                    let matched = index.enrich(&mut extraction.records);
                    tracing::info!(
                        "🗺️ {}/{} council members enriched with IBGE data",
                        matched,
                        extraction.records.len()
                    );
                }
            }
        }

        Ok(extraction)
    }

    async fn transform(&self, extraction: ArchiveExtraction) -> Result<TransformResult> {
        let role = Role::MunicipalCouncilMember;
        let ArchiveExtraction { records, stats } = extraction;

        tracing::info!(
            "{} elected women out of {} council members ({:.2}%), {} files",
            stats.gender.women,
            stats.gender.total,
            stats.gender.women_percentage,
            stats.files_processed
        );

        let states: Vec<String> = records.iter().map(|r| r.text("uf")).collect();
        let parties: Vec<String> = records.iter().map(|r| r.text("partido")).collect();
        log_top("Council members by state", &distribution(states.iter().map(String::as_str)), 10);
        log_top("Council members by party", &distribution(parties.iter().map(String::as_str)), 10);

        Ok(TransformResult {
            record_count: records.len(),
            outputs: vec![
                OutputFile {
                    path: role.csv_file(),
                    contents: write_csv(&records, role.csv_fields())?,
                },
                OutputFile {
                    path: role.stats_file(),
                    contents: to_pretty_json(&stats)?,
                },
            ],
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        write_outputs(&self.storage, &self.output_dir, &result).await
    }
}
