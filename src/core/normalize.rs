//! Mapping of source-specific field names onto the canonical record shape.

use crate::domain::model::{GenderStats, ParliamentarianRecord, Record, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A canonical field and the source names it is read from, in priority order.
/// The canonical name always comes first.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
}

const fn rule(name: &'static str, aliases: &'static [&'static str]) -> FieldRule {
    FieldRule { name, aliases }
}

/// Values that mean "nothing here" in the raw sources.
const EMPTY_MARKERS: &[&str] = &["n/a", "null", "none", "#nulo#", "#nulo"];

const NAME: FieldRule = rule("nome", &["nome", "nome_urna", "NM_URNA_CANDIDATO"]);
const CIVIL_NAME: FieldRule = rule("nome_civil", &["nome_civil", "NM_CANDIDATO"]);
const PARTY: FieldRule = rule("partido", &["partido", "sigla_partido", "SG_PARTIDO"]);
const STATE: FieldRule = rule("uf", &["uf", "estado", "sigla_uf", "SG_UF"]);
const TERM: FieldRule = rule("periodo_mandato", &["periodo_mandato", "mandato"]);
const BIRTH_DATE: FieldRule = rule("data_nascimento", &["data_nascimento", "DT_NASCIMENTO"]);
const BIRTHPLACE: FieldRule = rule("naturalidade", &["naturalidade"]);
const EMAIL: FieldRule = rule("email", &["email", "DS_EMAIL"]);
const SOURCE: FieldRule = rule("fonte_dados", &["fonte_dados", "fonte"]);
const SOURCE_URL: FieldRule = rule("url_fonte", &["url_fonte", "link_fonte"]);
const EXTRACTED_AT: FieldRule = rule("data_extracao", &["data_extracao"]);

const PROFILE_DETAILS: &[FieldRule] = &[
    rule("comissoes", &["comissoes"]),
    rule("formacao", &["formacao"]),
    rule("link_perfil", &["link_perfil", "url_perfil", "url_perfil_detalhado"]),
    rule("metodo_extracao", &["metodo_extracao"]),
    rule("numero_mandatos", &["numero_mandatos"]),
    rule("profissao", &["profissao", "ocupacao"]),
    rule("telefones", &["telefones", "telefone"]),
];

const COUNCILLOR_DETAILS: &[FieldRule] = &[
    rule("codigo_ibge_municipio", &["codigo_ibge_municipio"]),
    rule("cor_raca", &["cor_raca", "DS_COR_RACA"]),
    rule("estado_civil", &["estado_civil", "DS_ESTADO_CIVIL"]),
    rule("grau_instrucao", &["grau_instrucao", "DS_GRAU_INSTRUCAO"]),
    rule("idade", &["idade"]),
    rule("mesorregiao", &["mesorregiao"]),
    rule("microrregiao", &["microrregiao"]),
    rule("municipio", &["municipio", "NM_UE"]),
    rule("ocupacao", &["ocupacao", "DS_OCUPACAO"]),
    rule("regiao_brasil", &["regiao_brasil"]),
    rule("situacao", &["situacao", "DS_SIT_TOT_TURNO"]),
    rule("uf_nome_completo", &["uf_nome_completo"]),
];

/// Canonical fields shared by every role, in output order.
pub const COMMON_FIELDS: &[&str] = &[
    "nome",
    "nome_civil",
    "cargo",
    "partido",
    "uf",
    "periodo_mandato",
    "data_nascimento",
    "naturalidade",
    "email",
    "fonte_dados",
    "url_fonte",
    "data_extracao",
];

/// Trimmed text of a raw value; `null` and the empty markers read as "".
pub fn clean_value(value: Option<&serde_json::Value>) -> String {
    let text = match value {
        None | Some(serde_json::Value::Null) => return String::new(),
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };

    if EMPTY_MARKERS.contains(&text.to_lowercase().as_str()) {
        String::new()
    } else {
        text
    }
}

/// Drops the `(PARTY-UF)` suffix the Câmara listing appends to names.
pub fn strip_listing_suffix(name: &str) -> String {
    name.split('(').next().unwrap_or_default().trim().to_string()
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    role: Role,
}

impl Normalizer {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn detail_rules(&self) -> &'static [FieldRule] {
        match self.role {
            Role::FederalDeputy | Role::FederalSenator => PROFILE_DETAILS,
            Role::MunicipalCouncilMember => COUNCILLOR_DETAILS,
        }
    }

    /// Every key a normalized record of this role carries, in serialized order.
    pub fn fields(&self) -> Vec<&'static str> {
        COMMON_FIELDS
            .iter()
            .copied()
            .chain(self.detail_rules().iter().map(|rule| rule.name))
            .collect()
    }

    fn pick(&self, record: &Record, rule: &FieldRule) -> String {
        rule.aliases
            .iter()
            .map(|alias| clean_value(record.data.get(*alias)))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    pub fn normalize(&self, record: &Record) -> ParliamentarianRecord {
        let details = self
            .detail_rules()
            .iter()
            .map(|rule| (rule.name.to_string(), self.pick(record, rule)))
            .collect();

        let mut name = self.pick(record, &NAME);
        if self.role == Role::FederalDeputy {
            name = strip_listing_suffix(&name);
        }

        ParliamentarianRecord {
            name,
            civil_name: self.pick(record, &CIVIL_NAME),
            role: self.role,
            party: self.pick(record, &PARTY),
            state: self.pick(record, &STATE),
            term: self.pick(record, &TERM),
            birth_date: self.pick(record, &BIRTH_DATE),
            birthplace: self.pick(record, &BIRTHPLACE),
            email: self.pick(record, &EMAIL),
            source: self.pick(record, &SOURCE),
            source_url: self.pick(record, &SOURCE_URL),
            extracted_at: self.pick(record, &EXTRACTED_AT),
            details,
        }
    }

    pub fn normalize_all(&self, records: &[Record]) -> Vec<ParliamentarianRecord> {
        records.iter().map(|record| self.normalize(record)).collect()
    }
}

/// Header block of a per-source JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub fonte: String,
    pub tipo: String,
    pub url: String,
    pub total_registros: usize,
    pub data_processamento: String,
    pub campos: Vec<String>,
    pub campos_preenchidos: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estatisticas_genero: Option<GenderStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    pub metadados: SourceMetadata,
    pub dados: Vec<ParliamentarianRecord>,
}

impl NormalizedDocument {
    pub fn build(
        normalizer: &Normalizer,
        records: Vec<ParliamentarianRecord>,
        gender: Option<GenderStats>,
        processed_at: &str,
    ) -> Self {
        let role = normalizer.role();
        let fields = normalizer.fields();

        let campos_preenchidos = fields
            .iter()
            .map(|field| {
                let filled = records
                    .iter()
                    .filter(|record| record.get(field).is_some_and(|v| !v.is_empty()))
                    .count();
                (field.to_string(), filled)
            })
            .collect();

        Self {
            metadados: SourceMetadata {
                fonte: role.source_name().to_string(),
                tipo: role.collection_label().to_string(),
                url: role.homepage().to_string(),
                total_registros: records.len(),
                data_processamento: processed_at.to_string(),
                campos: fields.iter().map(|f| f.to_string()).collect(),
                campos_preenchidos,
                estatisticas_genero: gender,
            },
            dados: records,
        }
    }
}
