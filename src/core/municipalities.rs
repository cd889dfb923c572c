//! Municipality details from the IBGE localities API.
//!
//! Records are matched on the uppercase municipality name within their state.
//! A name missing from the state, or a record without a state, falls back to
//! the name alone when that name is unique in the country.

use crate::core::http::{FetchOutcome, PageFetcher};
use crate::domain::model::Record;
use crate::utils::error::Result;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct IbgeMunicipality {
    id: u64,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    microrregiao: Option<IbgeMicroregion>,
}

#[derive(Debug, Deserialize)]
struct IbgeMicroregion {
    #[serde(default)]
    nome: String,
    #[serde(default)]
    mesorregiao: Option<IbgeMesoregion>,
}

#[derive(Debug, Deserialize)]
struct IbgeMesoregion {
    #[serde(default)]
    nome: String,
    #[serde(rename = "UF", default)]
    uf: Option<IbgeState>,
}

#[derive(Debug, Deserialize)]
struct IbgeState {
    #[serde(default)]
    sigla: String,
    #[serde(default)]
    nome: String,
    #[serde(default)]
    regiao: Option<IbgeRegion>,
}

#[derive(Debug, Deserialize)]
struct IbgeRegion {
    #[serde(default)]
    nome: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MunicipalityInfo {
    pub code: String,
    pub microregion: String,
    pub mesoregion: String,
    pub state_code: String,
    pub state_name: String,
    pub region: String,
}

impl From<IbgeMunicipality> for MunicipalityInfo {
    fn from(municipality: IbgeMunicipality) -> Self {
        let micro = municipality.microrregiao.as_ref();
        let meso = micro.and_then(|m| m.mesorregiao.as_ref());
        let state = meso.and_then(|m| m.uf.as_ref());

        Self {
            code: municipality.id.to_string(),
            microregion: micro.map(|m| m.nome.clone()).unwrap_or_default(),
            mesoregion: meso.map(|m| m.nome.clone()).unwrap_or_default(),
            state_code: state.map(|s| s.sigla.clone()).unwrap_or_default(),
            state_name: state.map(|s| s.nome.clone()).unwrap_or_default(),
            region: state
                .and_then(|s| s.regiao.as_ref())
                .map(|r| r.nome.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MunicipalityIndex {
    by_state: HashMap<(String, String), MunicipalityInfo>,
    /// `None` marks a name shared by municipalities in different states.
    by_name: HashMap<String, Option<MunicipalityInfo>>,
}

impl MunicipalityIndex {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let municipalities: Vec<IbgeMunicipality> = serde_json::from_slice(bytes)?;
        let mut index = Self::default();

        for municipality in municipalities {
            let name = municipality.nome.trim().to_uppercase();
            let info = MunicipalityInfo::from(municipality);

            index
                .by_name
                .entry(name.clone())
                .and_modify(|existing| *existing = None)
                .or_insert_with(|| Some(info.clone()));
            index.by_state.insert((name, info.state_code.clone()), info);
        }

        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.by_state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_state.is_empty()
    }

    pub fn lookup(&self, municipality: &str, state: &str) -> Option<&MunicipalityInfo> {
        let name = municipality.trim().to_uppercase();
        self.by_state
            .get(&(name.clone(), state.trim().to_uppercase()))
            .or_else(|| self.by_name.get(&name).and_then(Option::as_ref))
    }

    /// Adds the IBGE columns to every record whose municipality is known and
    /// returns how many matched.
    pub fn enrich(&self, records: &mut [Record]) -> usize {
        let mut matched = 0;
        for record in records.iter_mut() {
            let Some(info) = self.lookup(&record.text("municipio"), &record.text("uf")) else {
                continue;
            };
            record.set("codigo_ibge_municipio", info.code.as_str());
            record.set("microrregiao", info.microregion.as_str());
            record.set("mesorregiao", info.mesoregion.as_str());
            record.set("uf_nome_completo", info.state_name.as_str());
            record.set("regiao_brasil", info.region.as_str());
            matched += 1;
        }
        matched
    }
}

/// The municipality index, or `None` when the API cannot be read.
pub async fn fetch_municipality_index(fetcher: &PageFetcher, url: &str) -> Option<MunicipalityIndex> {
    let body = match fetcher.fetch_bytes(url).await {
        FetchOutcome::Fetched(body) => body,
        FetchOutcome::NotFound => {
            tracing::warn!("⚠️ IBGE municipalities not found at {}", url);
            return None;
        }
        FetchOutcome::Abandoned { reason, .. } => {
            tracing::warn!("⚠️ IBGE municipalities unavailable: {}", reason);
            return None;
        }
    };

    match MunicipalityIndex::from_json(&body) {
        Ok(index) => {
            tracing::info!("✓ {} IBGE municipalities loaded", index.len());
            Some(index)
        }
        Err(e) => {
            tracing::warn!("⚠️ Unreadable IBGE response: {}", e);
            None
        }
    }
}
