use crate::domain::ports::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Runs extract, transform and load in order; the first failing phase ends the run
    /// and nothing is written.
    pub async fn run(&self) -> Result<String> {
        let name = self.pipeline.name();
        tracing::info!("🚀 Starting job: {}", name);
        self.monitor.log_stats("Start");

        tracing::info!("📥 [{}] Extracting...", name);
        let extracted = self.pipeline.extract().await?;
        self.monitor.log_stats("Extract");

        tracing::info!("🔄 [{}] Transforming...", name);
        let transformed = self.pipeline.transform(extracted).await?;
        tracing::info!(
            "🔄 [{}] {} records, {} output file(s)",
            name,
            transformed.record_count,
            transformed.outputs.len()
        );
        self.monitor.log_stats("Transform");

        tracing::info!("💾 [{}] Loading...", name);
        let output_path = self.pipeline.load(transformed).await?;
        self.monitor.log_stats("Load");

        tracing::info!("✅ [{}] Output saved to: {}", name, output_path);
        self.monitor.log_final_stats();

        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{OutputFile, TransformResult};
    use crate::utils::error::EtlError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingPipeline {
        fail_extract: bool,
        loaded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Pipeline for RecordingPipeline {
        type Extracted = Vec<String>;

        fn name(&self) -> &str {
            "recording"
        }

        async fn extract(&self) -> Result<Vec<String>> {
            if self.fail_extract {
                return Err(EtlError::ProcessingError {
                    message: "boom".to_string(),
                });
            }
            Ok(vec!["Ana".to_string(), "Bia".to_string()])
        }

        async fn transform(&self, data: Vec<String>) -> Result<TransformResult> {
            Ok(TransformResult {
                record_count: data.len(),
                outputs: vec![OutputFile {
                    path: "nomes.txt".to_string(),
                    contents: data.join("\n").into_bytes(),
                }],
            })
        }

        async fn load(&self, result: TransformResult) -> Result<String> {
            let mut loaded = self.loaded.lock().unwrap();
            for output in &result.outputs {
                loaded.push(output.path.clone());
            }
            Ok("out/nomes.txt".to_string())
        }
    }

    #[tokio::test]
    async fn test_run_goes_through_every_phase() {
        let engine = EtlEngine::new(RecordingPipeline {
            fail_extract: false,
            loaded: Mutex::new(Vec::new()),
        });

        let output = engine.run().await.unwrap();

        assert_eq!(output, "out/nomes.txt");
        assert_eq!(*engine.pipeline().loaded.lock().unwrap(), vec!["nomes.txt"]);
    }

    #[tokio::test]
    async fn test_extract_failure_skips_load() {
        let engine = EtlEngine::new_with_monitoring(
            RecordingPipeline {
                fail_extract: true,
                loaded: Mutex::new(Vec::new()),
            },
            false,
        );

        let result = engine.run().await;

        assert!(matches!(result, Err(EtlError::ProcessingError { .. })));
        assert!(engine.pipeline().loaded.lock().unwrap().is_empty());
    }
}
