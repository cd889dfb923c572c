//! Merges the three normalized documents into the consolidated artifact.

use crate::app::pipelines::{now_timestamp, write_outputs};
use crate::config::toml_config::AppConfig;
use crate::core::consolidate::{ConsolidatedDocument, Consolidator, TaggedCollection};
use crate::core::flatfile::to_pretty_json;
use crate::core::stats::{log_ranked, log_top};
use crate::domain::model::{OutputFile, Role, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;

pub struct ConsolidatePipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) output_dir: String,
    output_file: String,
    consolidator: Consolidator,
    generated_at: Option<String>,
}

impl<S: Storage> ConsolidatePipeline<S> {
    pub fn new(storage: S, config: &AppConfig) -> Self {
        Self {
            storage,
            output_dir: config.output.directory.clone(),
            output_file: config.consolidation.output_file.clone(),
            consolidator: Consolidator::new(&config.consolidation),
            generated_at: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.generated_at = Some(timestamp.to_string());
        self
    }

    async fn read_collection(&self, role: Role) -> TaggedCollection {
        let path = role.json_file();
        match self.storage.read_file(&path).await {
            Ok(data) => TaggedCollection::from_bytes(role, &path, Some(&data)),
            Err(e) if e.is_not_found() => TaggedCollection::from_bytes(role, &path, None),
            Err(e) => {
                tracing::warn!("✗ Could not read {} ({}), treated as empty", path, e);
                TaggedCollection::empty(role)
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ConsolidatePipeline<S> {
    type Extracted = Vec<TaggedCollection>;

    fn name(&self) -> &str {
        "consolidate"
    }

    async fn extract(&self) -> Result<Vec<TaggedCollection>> {
        let mut collections = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            collections.push(self.read_collection(role).await);
        }
        Ok(collections)
    }

    async fn transform(&self, collections: Vec<TaggedCollection>) -> Result<TransformResult> {
        let generated_at = self.generated_at.clone().unwrap_or_else(now_timestamp);
        let document: ConsolidatedDocument =
            self.consolidator.consolidate(&collections, &generated_at);

        let metadata = &document.metadados;
        tracing::info!("📊 {} records consolidated", metadata.total_registros);
        log_top("By role", &metadata.distribuicoes.por_cargo, 3);
        log_ranked("By party", &metadata.distribuicoes.por_partido, 10);
        log_ranked("By state", &metadata.distribuicoes.por_uf, 10);
        if let Some(gender) = &metadata.estatisticas_genero {
            tracing::info!(
                "Women: {} of {} ({:.2}%)",
                gender.women,
                gender.total,
                gender.women_percentage
            );
        }

        Ok(TransformResult {
            record_count: document.dados.len(),
            outputs: vec![OutputFile {
                path: self.output_file.clone(),
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
    use serde_json::json;

    #[tokio::test]
    async fn test_consolidates_available_documents() {
        let storage = MockStorage::new();
        let deputies = json!({
            "metadados": {"fonte": "Câmara dos Deputados"},
            "dados": [
                {"nome": "Erika Hilton", "partido": "PSOL", "uf": "SP"},
                {"nome": "Tabata Amaral", "partido": "PSB", "uf": "SP"}
            ]
        });
        let councillors = json!({
            "metadados": {"estatisticas_genero": {"total_mulheres": 1, "total_homens": 3}},
            "dados": [{"nome": "MARTA", "partido": "PT", "uf": "BA", "municipio": "SALVADOR"}]
        });
        storage
            .put("deputadas.json", &serde_json::to_vec(&deputies).unwrap())
            .await;
        storage
            .put("vereadoras.json", &serde_json::to_vec(&councillors).unwrap())
            .await;

        let pipeline = ConsolidatePipeline::new(storage.clone(), &AppConfig::default())
            .with_timestamp("2025-03-03 09:00:00");
        let output = EtlEngine::new(pipeline).run().await.unwrap();
        assert_eq!(output, "data/mulheres_politica_consolidado.json");

        let document: serde_json::Value = serde_json::from_slice(
            &storage
                .get_file("mulheres_politica_consolidado.json")
                .await
                .unwrap(),
        )
        .unwrap();
        let meta = &document["metadados"];
        assert_eq!(meta["total_registros"], 3);
        assert_eq!(document["dados"].as_array().unwrap().len(), 3);
        assert_eq!(meta["data_geracao"], "2025-03-03 09:00:00");
        assert_eq!(meta["fontes"][1]["total"], 0);
        assert_eq!(meta["distribuicoes"]["por_cargo"]["Senadora Federal"], 0);
        assert_eq!(meta["distribuicoes"]["por_uf"]["SP"], 2);
        assert_eq!(meta["estatisticas_genero"]["total_geral"], 4);
        assert_eq!(document["dados"][2]["cargo"], "Vereadora Municipal");
        assert_eq!(document["dados"][2]["municipio"], "SALVADOR");
    }

    #[tokio::test]
    async fn test_no_inputs_still_writes_empty_artifact() {
        let storage = MockStorage::new();
        let mut config = AppConfig::default();
        config.consolidation.output_file = "tudo.json".to_string();

        EtlEngine::new(ConsolidatePipeline::new(storage.clone(), &config))
            .run()
            .await
            .unwrap();

        let document: serde_json::Value =
            serde_json::from_slice(&storage.get_file("tudo.json").await.unwrap()).unwrap();
        assert_eq!(document["metadados"]["total_registros"], 0);
        assert!(document["dados"].as_array().unwrap().is_empty());
    }
}
