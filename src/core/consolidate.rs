//! Merges the per-source collections into one tagged artifact.

use crate::config::toml_config::ConsolidationConfig;
use crate::core::normalize::{Normalizer, COMMON_FIELDS};
use crate::core::stats::{distribution, ranked};
use crate::domain::model::{GenderStats, ParliamentarianRecord, Record, Role};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The records of one source, tagged with the role they hold.
#[derive(Debug, Clone)]
pub struct TaggedCollection {
    pub role: Role,
    pub records: Vec<Record>,
    pub gender: Option<GenderStats>,
}

impl TaggedCollection {
    pub fn empty(role: Role) -> Self {
        Self {
            role,
            records: Vec::new(),
            gender: None,
        }
    }

    /// Reads any of the accepted document shapes: a bare list of records, an
    /// object with `dados`, or an object keyed by the source's file stem.
    pub fn from_document(role: Role, document: &serde_json::Value) -> Self {
        let items = match document {
            serde_json::Value::Array(items) => Some(items),
            serde_json::Value::Object(object) => object
                .get("dados")
                .or_else(|| object.get(role.file_stem()))
                .and_then(|value| value.as_array()),
            _ => None,
        };

        let records = items
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned().map(Record::from))
                    .collect()
            })
            .unwrap_or_default();

        let gender = ["/metadados/estatisticas_genero", "/metadata/estatisticas_genero"]
            .iter()
            .find_map(|pointer| document.pointer(pointer))
            .and_then(|stats| serde_json::from_value::<GenderStats>(stats.clone()).ok())
            .map(|stats| GenderStats::new(stats.women, stats.men, stats.others));

        Self {
            role,
            records,
            gender,
        }
    }

    /// Missing or unparsable input is logged and read as an empty collection.
    pub fn from_bytes(role: Role, source: &str, data: Option<&[u8]>) -> Self {
        let Some(data) = data else {
            tracing::warn!("✗ {} not found, {} treated as empty", source, role.collection_label());
            return Self::empty(role);
        };

        match serde_json::from_slice::<serde_json::Value>(data) {
            Ok(document) => {
                let collection = Self::from_document(role, &document);
                tracing::info!(
                    "✓ {} {} loaded from {}",
                    collection.records.len(),
                    role.collection_label(),
                    source
                );
                collection
            }
            Err(e) => {
                tracing::warn!("✗ {} is not valid JSON ({}), treated as empty", source, e);
                Self::empty(role)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub tipo: String,
    pub fonte: String,
    pub url: String,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distributions {
    pub por_cargo: BTreeMap<String, usize>,
    /// Most frequent first.
    pub por_partido: IndexMap<String, usize>,
    pub por_uf: IndexMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub projeto: String,
    pub descricao: String,
    pub total_registros: usize,
    pub data_geracao: String,
    pub fontes: Vec<SourceSummary>,
    pub campos_comuns: Vec<String>,
    pub distribuicoes: Distributions,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estatisticas_genero: Option<GenderStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedDocument {
    pub metadados: ConsolidatedMetadata,
    pub dados: Vec<ParliamentarianRecord>,
}

pub struct Consolidator {
    project: String,
    description: String,
}

impl Consolidator {
    pub fn new(config: &ConsolidationConfig) -> Self {
        Self {
            project: config.project.clone(),
            description: config.description.clone(),
        }
    }

    pub fn consolidate(
        &self,
        collections: &[TaggedCollection],
        generated_at: &str,
    ) -> ConsolidatedDocument {
        let mut records = Vec::new();
        let mut sources = Vec::new();
        let mut by_role = BTreeMap::new();
        let mut gender: Option<GenderStats> = None;

        for collection in collections {
            let normalizer = Normalizer::new(collection.role);
            records.extend(normalizer.normalize_all(&collection.records));

            *by_role
                .entry(collection.role.label().to_string())
                .or_insert(0) += collection.records.len();

            sources.push(SourceSummary {
                tipo: collection.role.collection_label().to_string(),
                fonte: collection.role.source_name().to_string(),
                url: collection.role.homepage().to_string(),
                total: collection.records.len(),
            });

            if let Some(stats) = &collection.gender {
                gender = Some(match gender {
                    Some(total) => total.combine(stats),
                    None => *stats,
                });
            }
        }

        let distribuicoes = Distributions {
            por_cargo: by_role,
            por_partido: ranked(&distribution(records.iter().map(|r| r.party.as_str()))),
            por_uf: ranked(&distribution(records.iter().map(|r| r.state.as_str()))),
        };

        ConsolidatedDocument {
            metadados: ConsolidatedMetadata {
                projeto: self.project.clone(),
                descricao: self.description.clone(),
                total_registros: records.len(),
                data_geracao: generated_at.to_string(),
                fontes: sources,
                campos_comuns: COMMON_FIELDS.iter().map(|f| f.to_string()).collect(),
                distribuicoes,
                estatisticas_genero: gender,
            },
            dados: records,
        }
    }
}
