//! Detail extraction from individual parliamentarian profile pages.

use crate::core::http::{pause_for, FetchOutcome, PageFetcher};
use crate::core::selectors::{collapse_whitespace, document_text, element_text};
use crate::domain::model::Record;
use crate::utils::error::{EtlError, Result};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use std::time::Duration;

/// Field keys filled by [`ProfileExtractor::extract`], always present in its output.
pub const PROFILE_FIELDS: &[&str] = &[
    "nome_civil",
    "partido",
    "uf",
    "data_nascimento",
    "naturalidade",
    "profissao",
    "formacao",
    "numero_mandatos",
    "comissoes",
    "biografia_resumida",
    "telefones",
    "email",
    "periodo_mandato",
];

pub const KNOWN_PARTIES: &[&str] = &[
    "PT", "PL", "PP", "MDB", "PSDB", "PDT", "PSB", "REPUBLICANOS", "UNIAO", "UNIÃO", "PSOL",
    "PCdoB", "PCDOB", "PSD", "CIDADANIA", "AVANTE", "PODE", "PODEMOS", "SOLIDARIEDADE", "NOVO",
    "REDE", "PV", "PMB", "PROS", "PTB", "PSC", "PATRIOTA", "PRD",
];

pub const STATE_CODES: &[&str] = &[
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

pub fn is_state_code(value: &str) -> bool {
    STATE_CODES.contains(&value)
}

#[derive(Debug, Clone, Default)]
pub struct ProfileOptions {
    /// Look for a `PARTY - UF` pair in the page text.
    pub party_and_state: bool,
    /// Keep an email only when it contains this domain.
    pub email_domain: Option<String>,
    /// Restricts the extracted keys; `None` keeps all of [`PROFILE_FIELDS`].
    pub fields: Option<&'static [&'static str]>,
}

pub struct ProfileExtractor {
    options: ProfileOptions,
    labelled_party: Regex,
    bare_party: Regex,
    birth_date: Regex,
    birthplace: Regex,
    profession: Regex,
    education: Regex,
    terms: Regex,
    committees_label: Regex,
    labelled_phone: Regex,
    office_phone: Regex,
    email: Regex,
    term_years: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| EtlError::ProcessingError {
        message: format!("Invalid profile pattern {}: {}", pattern, e),
    })
}

impl ProfileExtractor {
    pub fn new(options: ProfileOptions) -> Result<Self> {
        Ok(Self {
            options,
            labelled_party: compile(r"(?i)Partido:\s*([A-Z]{2,10})\s*-\s*([A-Z]{2})")?,
            bare_party: compile(r"\b([A-Za-z]{2,12})\s*-\s*([A-Z]{2})\b")?,
            birth_date: compile(
                r"(?i)(?:Data de Nascimento|Nascimento|Nascido|Nascida)[:\s]*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})",
            )?,
            birthplace: compile(r"(?i)(?:Natural de|Naturalidade)[:\s]*([A-ZÁÉÍÓÚÂÊÔÃÕÇ][^.;\n]{3,80})")?,
            profession: compile(r"(?i)(?:Profissão|Ocupação)[:\s]*([A-Za-zÁ-ÿ\s\-]+?)(?:\n|\.|,)")?,
            education: compile(
                r"(?i)(?:Formação|Graduação|Curso)[:\s]*(?:em\s)?([A-Za-zÁ-ÿ\s\-]+?)(?:\n|\.|,)",
            )?,
            terms: compile(r"(?i)(\d+)[ºª°]?\s*(?:mandato|legislatura)")?,
            committees_label: compile(r"(?i)comissões?")?,
            labelled_phone: compile(r"(?i)(?:Telefone|Tel|Fone|Contato)[:\s]*(\([0-9]{2}\)\s*[0-9\-\s]+)")?,
            office_phone: compile(r"\(61\)\s*\d{4}-\d{4}")?,
            email: compile(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")?,
            term_years: compile(r"(\d{4})\s*(?:-|a|até)\s*(\d{4})")?,
        })
    }

    /// Every key of [`PROFILE_FIELDS`], empty when the page does not show it.
    pub fn extract(&self, html: &str) -> BTreeMap<String, String> {
        let document = Html::parse_document(html);
        let text = document_text(&document);

        let mut details: BTreeMap<String, String> = PROFILE_FIELDS
            .iter()
            .map(|field| (field.to_string(), String::new()))
            .collect();
        let mut put = |key: &str, value: String| {
            details.insert(key.to_string(), value);
        };

        if self.options.party_and_state {
            if let Some((party, state)) = self.party_and_state(&text) {
                put("partido", party);
                put("uf", state);
            }
        }

        if let Some(heading) = first_heading(&document) {
            put("nome_civil", heading);
        }

        if let Some(caps) = self.birth_date.captures(&text) {
            put("data_nascimento", caps[1].to_string());
        }

        if let Some(caps) = self.birthplace.captures(&text) {
            let raw = caps[1].trim();
            let raw = raw.split("Gabinete").next().unwrap_or(raw);
            put("naturalidade", truncate_chars(&collapse_whitespace(raw), 100));
        }

        if let Some(caps) = self.profession.captures(&text) {
            put("profissao", truncate_chars(caps[1].trim(), 100));
        }

        if let Some(caps) = self.education.captures(&text) {
            put("formacao", truncate_chars(caps[1].trim(), 150));
        }

        if let Some(caps) = self.terms.captures(&text) {
            put("numero_mandatos", caps[1].to_string());
        }

        if let Some(committees) = self.committees(&document) {
            put("comissoes", committees);
        }

        if let Some(biography) = short_biography(&document) {
            put("biografia_resumida", biography);
        }

        if let Some(caps) = self.labelled_phone.captures(&text) {
            put("telefones", truncate_chars(caps[1].trim(), 50));
        } else if let Some(found) = self.office_phone.find(&text) {
            put("telefones", found.as_str().to_string());
        }

        if let Some(found) = self.email.find(&text) {
            let email = found.as_str();
            let accepted = match &self.options.email_domain {
                Some(domain) => email.to_lowercase().contains(&domain.to_lowercase()),
                None => true,
            };
            if accepted {
                put("email", email.to_string());
            }
        }

        if let Some(caps) = self.term_years.captures(&text) {
            put("periodo_mandato", format!("{} - {}", &caps[1], &caps[2]));
        }

        if let Some(fields) = self.options.fields {
            details.retain(|key, _| fields.contains(&key.as_str()));
        }

        details
    }

    /// A labelled `Partido: XX - UF` wins; an unlabelled pair only counts when
    /// both halves are recognised.
    fn party_and_state(&self, text: &str) -> Option<(String, String)> {
        if let Some(caps) = self.labelled_party.captures(text) {
            return Some((caps[1].trim().to_string(), caps[2].trim().to_uppercase()));
        }

        self.bare_party.captures_iter(text).find_map(|caps| {
            let party = caps[1].trim();
            let state = caps[2].trim();
            (KNOWN_PARTIES.contains(&party) && is_state_code(state))
                .then(|| (party.to_string(), state.to_string()))
        })
    }

    /// Text of the first list or paragraph after the element labelled "Comissões".
    fn committees(&self, document: &Html) -> Option<String> {
        let mut elements = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap);

        elements.find(|element| {
            element
                .children()
                .filter_map(|child| child.value().as_text())
                .any(|own_text| self.committees_label.is_match(own_text))
        })?;

        elements
            .find(|element| matches!(element.value().name(), "ul" | "ol" | "p"))
            .map(|list| truncate_chars(&element_text(list), 250))
            .filter(|text| !text.is_empty())
    }
}

fn first_heading(document: &Html) -> Option<String> {
    let headings = scraper::Selector::parse("h1, h2").ok()?;
    document.select(&headings).find_map(|heading| {
        let text = element_text(heading);
        let length = text.chars().count();
        (length > 3 && length < 100).then_some(text)
    })
}

/// Among the first three paragraphs, those longer than 50 characters.
fn short_biography(document: &Html) -> Option<String> {
    let paragraphs = scraper::Selector::parse("p").ok()?;
    let parts: Vec<String> = document
        .select(&paragraphs)
        .take(3)
        .map(element_text)
        .filter(|text| text.chars().count() > 50)
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(truncate_chars(&parts.join(" "), 400))
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Fetches the profile of every record that has a `link_perfil` and merges the
/// details found into it. A failed fetch leaves the record as it was.
pub async fn enrich_profiles(
    fetcher: &PageFetcher,
    extractor: &ProfileExtractor,
    records: Vec<Record>,
    delay: Duration,
) -> Vec<Record> {
    let total = records.len();
    let mut enriched = Vec::with_capacity(total);
    let mut fetched = 0;

    for (index, mut record) in records.into_iter().enumerate() {
        let name = record.text("nome");
        let link = record.text("link_perfil");

        if link.is_empty() {
            tracing::debug!("[{}/{}] {}: no profile link", index + 1, total, name);
            enriched.push(record);
            continue;
        }

        if fetched > 0 {
            pause_for(delay).await;
        }
        fetched += 1;

        match fetcher.fetch_text(&link).await {
            FetchOutcome::Fetched(html) => {
                let details = extractor.extract(&html);
                record.merge_non_empty(&details);
                tracing::info!("[{}/{}] ✓ {}: profile details collected", index + 1, total, name);
            }
            FetchOutcome::NotFound => {
                tracing::warn!("[{}/{}] ✗ {}: profile not found", index + 1, total, name);
            }
            FetchOutcome::Abandoned { reason, .. } => {
                tracing::warn!("[{}/{}] ✗ {}: {}", index + 1, total, name, reason);
            }
        }

        enriched.push(record);
    }

    enriched
}
