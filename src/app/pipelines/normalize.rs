//! Turns one collection's CSV into its normalized JSON document.

use crate::app::pipelines::{now_timestamp, write_outputs};
use crate::config::toml_config::AppConfig;
use crate::core::flatfile::{read_csv, to_pretty_json};
use crate::core::normalize::{NormalizedDocument, Normalizer};
use crate::domain::model::{GenderStats, OutputFile, Record, Role, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;

/// Raw rows of a collection and its gender sidecar, when one was written.
#[derive(Debug, Clone)]
pub struct SourceRecords {
    pub records: Vec<Record>,
    pub gender: Option<GenderStats>,
}

pub struct NormalizePipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) output_dir: String,
    name: String,
    normalizer: Normalizer,
    processed_at: Option<String>,
}

impl<S: Storage> NormalizePipeline<S> {
    pub fn new(storage: S, role: Role, config: &AppConfig) -> Self {
        Self {
            storage,
            output_dir: config.output.directory.clone(),
            name: format!("normalize {}", role.file_stem()),
            normalizer: Normalizer::new(role),
            processed_at: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.processed_at = Some(timestamp.to_string());
        self
    }

    async fn read_gender_stats(&self) -> Result<Option<GenderStats>> {
        let path = self.normalizer.role().stats_file();
        let data = match self.storage.read_file(&path).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_slice::<GenderStats>(&data) {
            Ok(stats) => Ok(Some(GenderStats::new(stats.women, stats.men, stats.others))),
            Err(e) => {
                tracing::warn!("⚠️ Ignoring unreadable {}: {}", path, e);
                Ok(None)
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for NormalizePipeline<S> {
    type Extracted = SourceRecords;

    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(&self) -> Result<SourceRecords> {
        let path = self.normalizer.role().csv_file();
        let records = read_csv(&self.storage.read_file(&path).await?)?;
        tracing::info!("✓ {} rows read from {}", records.len(), path);

        Ok(SourceRecords {
            records,
            gender: self.read_gender_stats().await?,
        })
    }

    async fn transform(&self, source: SourceRecords) -> Result<TransformResult> {
        let role = self.normalizer.role();
        let processed_at = self.processed_at.clone().unwrap_or_else(now_timestamp);

        let normalized = self.normalizer.normalize_all(&source.records);
        let document =
            NormalizedDocument::build(&self.normalizer, normalized, source.gender, &processed_at);

        for (field, filled) in &document.metadados.campos_preenchidos {
            tracing::debug!("{}: {}/{}", field, filled, document.metadados.total_registros);
        }

        Ok(TransformResult {
            record_count: document.dados.len(),
            outputs: vec![OutputFile {
                path: role.json_file(),
                contents: to_pretty_json(&document)?,
            }],
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        write_outputs(&self.storage, &self.output_dir, &result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipelines::test_support::MockStorage;
    use crate::core::etl::EtlEngine;

    const SENATORS_CSV: &str = "nome,nome_civil,partido,uf,periodo_mandato,telefones,email,link_perfil\n\
        Teresa Leitão,Maria Teresa Leitão de Melo,PT,PE,2023 - 2031,(61) 3303-2423,sen.teresaleitao@senado.leg.br,https://www25.senado.leg.br/senadores/5012\n\
        Damares Alves,,REPUBLICANOS,DF,2023 - 2031,,N/A,\n";

    #[tokio::test]
    async fn test_csv_and_sidecar_become_normalized_document() {
        let storage = MockStorage::new();
        storage.put("senadoras.csv", SENATORS_CSV.as_bytes()).await;
        storage
            .put(
                "senadoras_stats.json",
                br#"{"total_mulheres": 2, "total_homens": 79, "total_outros": 0, "total_geral": 81, "porcentagem_mulheres": 2.47}"#,
            )
            .await;

        let pipeline = NormalizePipeline::new(storage.clone(), Role::FederalSenator, &AppConfig::default())
            .with_timestamp("2025-03-02 08:00:00");
        let output = EtlEngine::new(pipeline).run().await.unwrap();
        assert_eq!(output, "data/senadoras.json");

        let document: serde_json::Value =
            serde_json::from_slice(&storage.get_file("senadoras.json").await.unwrap()).unwrap();
        let meta = &document["metadados"];
        assert_eq!(meta["fonte"], "Senado Federal");
        assert_eq!(meta["total_registros"], 2);
        assert_eq!(meta["data_processamento"], "2025-03-02 08:00:00");
        assert_eq!(meta["campos_preenchidos"]["email"], 1);
        assert_eq!(meta["campos_preenchidos"]["link_perfil"], 1);
        assert_eq!(meta["estatisticas_genero"]["total_homens"], 79);

        let damares = &document["dados"][1];
        assert_eq!(damares["cargo"], "Senadora Federal");
        assert_eq!(damares["email"], "");
        assert_eq!(damares["nome_civil"], "");
        assert_eq!(damares["telefones"], "");
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_optional() {
        let storage = MockStorage::new();
        storage
            .put("deputadas.csv", "nome,partido,uf\nErika Hilton,PSOL,SP\n".as_bytes())
            .await;

        let pipeline = NormalizePipeline::new(storage.clone(), Role::FederalDeputy, &AppConfig::default());
        EtlEngine::new(pipeline).run().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_slice(&storage.get_file("deputadas.json").await.unwrap()).unwrap();
        assert!(document["metadados"].get("estatisticas_genero").is_none());
        assert_eq!(document["dados"][0]["partido"], "PSOL");
    }

    #[tokio::test]
    async fn test_unreadable_sidecar_is_ignored() {
        let storage = MockStorage::new();
        storage
            .put("vereadoras.csv", "NM_URNA_CANDIDATO,SG_UF\nMARTA,BA\n".as_bytes())
            .await;
        storage.put("vereadoras_stats.json", b"{oops").await;

        let pipeline =
            NormalizePipeline::new(storage.clone(), Role::MunicipalCouncilMember, &AppConfig::default());
        EtlEngine::new(pipeline).run().await.unwrap();

        let document: serde_json::Value =
            serde_json::from_slice(&storage.get_file("vereadoras.json").await.unwrap()).unwrap();
        assert!(document["metadados"].get("estatisticas_genero").is_none());
        assert_eq!(document["dados"][0]["nome"], "MARTA");
        assert_eq!(document["dados"][0]["uf"], "BA");
    }

    #[tokio::test]
    async fn test_missing_csv_fails_without_writing() {
        let storage = MockStorage::new();
        let pipeline = NormalizePipeline::new(storage.clone(), Role::FederalDeputy, &AppConfig::default());

        let err = EtlEngine::new(pipeline).run().await.unwrap_err();

        assert!(err.is_not_found());
        assert!(storage.get_file("deputadas.json").await.is_none());
    }
}
