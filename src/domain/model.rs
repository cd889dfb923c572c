use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A raw field mapping as scraped from a page fragment or read back from a flat file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.data
            .insert(key.to_string(), serde_json::Value::String(value.into()));
    }

    /// Field as trimmed text; missing keys and `null` read as empty.
    pub fn text(&self, key: &str) -> String {
        match self.data.get(key) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// Overwrites fields with the non-empty values of `other`.
    pub fn merge_non_empty(&mut self, other: &BTreeMap<String, String>) {
        for (key, value) in other {
            if !value.trim().is_empty() {
                self.set(key, value.trim());
            } else {
                self.data
                    .entry(key.clone())
                    .or_insert_with(|| serde_json::Value::String(String::new()));
            }
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Record {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            data: map.into_iter().collect(),
        }
    }
}

/// CSV columns written by the Câmara and Senado collectors.
pub const PROFILE_CSV_FIELDS: &[&str] = &[
    "nome",
    "nome_civil",
    "partido",
    "uf",
    "periodo_mandato",
    "telefones",
    "email",
    "data_nascimento",
    "naturalidade",
    "profissao",
    "formacao",
    "numero_mandatos",
    "comissoes",
    "link_perfil",
    "fonte_dados",
    "url_fonte",
    "data_extracao",
    "metodo_extracao",
];

/// CSV columns written by the TSE collector.
pub const COUNCILLOR_CSV_FIELDS: &[&str] = &[
    "nome",
    "nome_civil",
    "partido",
    "uf",
    "municipio",
    "periodo_mandato",
    "naturalidade",
    "situacao",
    "data_nascimento",
    "grau_instrucao",
    "ocupacao",
    "estado_civil",
    "cor_raca",
    "email",
    "idade",
    "codigo_ibge_municipio",
    "microrregiao",
    "mesorregiao",
    "uf_nome_completo",
    "regiao_brasil",
    "fonte_dados",
    "url_fonte",
    "data_extracao",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Role {
    #[serde(rename = "Deputada Federal")]
    #[cfg_attr(feature = "cli", value(name = "deputies"))]
    FederalDeputy,
    #[serde(rename = "Senadora Federal")]
    #[cfg_attr(feature = "cli", value(name = "senators"))]
    FederalSenator,
    #[serde(rename = "Vereadora Municipal")]
    #[cfg_attr(feature = "cli", value(name = "councillors"))]
    MunicipalCouncilMember,
}

impl Role {
    pub const ALL: [Role; 3] = [
        Role::FederalDeputy,
        Role::FederalSenator,
        Role::MunicipalCouncilMember,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Role::FederalDeputy => "Deputada Federal",
            Role::FederalSenator => "Senadora Federal",
            Role::MunicipalCouncilMember => "Vereadora Municipal",
        }
    }

    pub fn collection_label(&self) -> &'static str {
        match self {
            Role::FederalDeputy => "Deputadas Federais",
            Role::FederalSenator => "Senadoras Federais",
            Role::MunicipalCouncilMember => "Vereadoras Municipais",
        }
    }

    pub fn source_name(&self) -> &'static str {
        match self {
            Role::FederalDeputy => "Câmara dos Deputados",
            Role::FederalSenator => "Senado Federal",
            Role::MunicipalCouncilMember => "TSE",
        }
    }

    pub fn homepage(&self) -> &'static str {
        match self {
            Role::FederalDeputy => "https://www.camara.leg.br",
            Role::FederalSenator => "https://www25.senado.leg.br",
            Role::MunicipalCouncilMember => "https://dadosabertos.tse.jus.br",
        }
    }

    /// Base name of every file this role's jobs read or write, also the legacy
    /// top-level key of older per-source JSON documents.
    pub fn file_stem(&self) -> &'static str {
        match self {
            Role::FederalDeputy => "deputadas",
            Role::FederalSenator => "senadoras",
            Role::MunicipalCouncilMember => "vereadoras",
        }
    }

    pub fn csv_fields(&self) -> &'static [&'static str] {
        match self {
            Role::FederalDeputy | Role::FederalSenator => PROFILE_CSV_FIELDS,
            Role::MunicipalCouncilMember => COUNCILLOR_CSV_FIELDS,
        }
    }

    pub fn csv_file(&self) -> String {
        format!("{}.csv", self.file_stem())
    }

    pub fn json_file(&self) -> String {
        format!("{}.json", self.file_stem())
    }

    pub fn stats_file(&self) -> String {
        format!("{}_stats.json", self.file_stem())
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Canonical record shape shared by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParliamentarianRecord {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "nome_civil")]
    pub civil_name: String,
    #[serde(rename = "cargo")]
    pub role: Role,
    #[serde(rename = "partido")]
    pub party: String,
    #[serde(rename = "uf")]
    pub state: String,
    #[serde(rename = "periodo_mandato")]
    pub term: String,
    #[serde(rename = "data_nascimento")]
    pub birth_date: String,
    #[serde(rename = "naturalidade")]
    pub birthplace: String,
    pub email: String,
    #[serde(rename = "fonte_dados")]
    pub source: String,
    #[serde(rename = "url_fonte")]
    pub source_url: String,
    #[serde(rename = "data_extracao")]
    pub extracted_at: String,
    /// Role-specific fields; every key of the role's schema is present.
    #[serde(flatten)]
    pub details: BTreeMap<String, String>,
}

impl ParliamentarianRecord {
    /// Value of a canonical field by its serialized name.
    pub fn get(&self, field: &str) -> Option<&str> {
        let value = match field {
            "nome" => &self.name,
            "nome_civil" => &self.civil_name,
            "cargo" => return Some(self.role.label()),
            "partido" => &self.party,
            "uf" => &self.state,
            "periodo_mandato" => &self.term,
            "data_nascimento" => &self.birth_date,
            "naturalidade" => &self.birthplace,
            "email" => &self.email,
            "fonte_dados" => &self.source,
            "url_fonte" => &self.source_url,
            "data_extracao" => &self.extracted_at,
            other => return self.details.get(other).map(String::as_str),
        };
        Some(value.as_str())
    }
}

/// Counts of elected or sitting members by gender for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenderStats {
    #[serde(rename = "total_mulheres", default)]
    pub women: usize,
    #[serde(rename = "total_homens", default)]
    pub men: usize,
    #[serde(rename = "total_outros", default)]
    pub others: usize,
    #[serde(rename = "total_geral", default)]
    pub total: usize,
    #[serde(rename = "porcentagem_mulheres", default)]
    pub women_percentage: f64,
}

impl GenderStats {
    pub fn new(women: usize, men: usize, others: usize) -> Self {
        let total = women + men + others;
        let women_percentage = if total > 0 {
            ((women as f64 / total as f64) * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        Self {
            women,
            men,
            others,
            total,
            women_percentage,
        }
    }

    pub fn combine(&self, other: &GenderStats) -> GenderStats {
        GenderStats::new(
            self.women + other.women,
            self.men + other.men,
            self.others + other.others,
        )
    }
}

/// A file produced by a pipeline's transform step, relative to the storage root.
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub record_count: usize,
    /// The first entry is the primary artifact.
    pub outputs: Vec<OutputFile>,
}
