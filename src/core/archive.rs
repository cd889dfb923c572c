//! Elected council members from the TSE candidate archive (`consulta_cand_<year>.zip`).
//!
//! The archive holds one `;`-separated, Latin-1 encoded CSV per state plus a
//! national file that duplicates them.

use crate::config::toml_config::CouncillorsConfig;
use crate::core::http::{FetchOutcome, PageFetcher};
use crate::domain::model::{GenderStats, Record};
use crate::utils::error::{EtlError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

pub const SOURCE_LABEL: &str = "TSE - Dados Abertos 2024";

const COUNCIL_MEMBER_CODE: &str = "13";
const MALE_CODE: &str = "2";
const FEMALE_CODE: &str = "4";
const ELECTED_SITUATIONS: &[&str] = &["ELEITO", "ELEITO POR QP", "ELEITO POR MÉDIA"];
const NOT_INFORMED: &str = "Não Informado";
const UNDISCLOSED_EMAIL: &str = "Não divulgado";

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    /// Recorded as `url_fonte` on every record.
    pub source_url: String,
    pub term: String,
    /// Uppercase state codes; empty keeps every state.
    pub states: Vec<String>,
    /// `YYYY-MM-DD`.
    pub extracted_on: String,
}

/// Gender counts over every elected council member, written next to the CSV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CouncillorStats {
    #[serde(flatten)]
    pub gender: GenderStats,
    #[serde(rename = "arquivos_processados", default)]
    pub files_processed: usize,
}

#[derive(Debug, Clone)]
pub struct ArchiveExtraction {
    pub records: Vec<Record>,
    pub stats: CouncillorStats,
}

#[derive(Default)]
struct Tally {
    women: usize,
    men: usize,
    others: usize,
}

/// Per-state CSV entries, in archive order.
pub fn candidate_entries(names: impl IntoIterator<Item = String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".csv") && lower.contains("consulta_cand") && !lower.contains("brasil")
        })
        .collect()
}

/// `consulta_cand_2024_SP.csv` → `SP`.
pub fn state_of_entry(name: &str) -> String {
    let stem = name.to_uppercase().replace(".CSV", "");
    let chars: Vec<char> = stem.chars().collect();
    chars[chars.len().saturating_sub(2)..].iter().collect()
}

/// Whole years between a `DD/MM/YYYY` birth date and a `YYYY-MM-DD` date.
pub fn age_on(birth_date: &str, on: &str) -> Option<u32> {
    let birth = chrono::NaiveDate::parse_from_str(birth_date.trim(), "%d/%m/%Y").ok()?;
    let on = chrono::NaiveDate::parse_from_str(on.trim(), "%Y-%m-%d").ok()?;
    on.years_since(birth)
}

pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

pub fn extract_councillors(archive_bytes: &[u8], settings: &ArchiveSettings) -> Result<ArchiveExtraction> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let entries = candidate_entries(names);

    if entries.is_empty() {
        tracing::warn!("⚠️ Archive contains no consulta_cand CSV files");
    } else {
        tracing::info!("Found {} state files in archive", entries.len());
    }

    let mut records = Vec::new();
    let mut tally = Tally::default();
    let mut files_processed = 0;

    for (index, name) in entries.iter().enumerate() {
        let state = state_of_entry(name);
        if !settings.states.is_empty() && !settings.states.iter().any(|s| s == &state) {
            continue;
        }

        let mut raw = Vec::new();
        let read = archive
            .by_name(name)
            .map_err(|e| e.to_string())
            .and_then(|mut entry| entry.read_to_end(&mut raw).map_err(|e| e.to_string()));
        if let Err(reason) = read {
            tracing::warn!("✗ Skipping {}: {}", name, reason);
            continue;
        }

        let before = records.len();
        match parse_state_file(&decode_latin1(&raw), settings, &mut tally, &mut records) {
            Ok(()) => {
                files_processed += 1;
                tracing::info!(
                    "[{:02}/{:02}] {}: {} council members",
                    index + 1,
                    entries.len(),
                    state,
                    records.len() - before
                );
            }
            Err(e) => tracing::warn!("✗ Could not read {}: {}", name, e),
        }
    }

    Ok(ArchiveExtraction {
        records,
        stats: CouncillorStats {
            gender: GenderStats::new(tally.women, tally.men, tally.others),
            files_processed,
        },
    })
}

fn parse_state_file(
    text: &str,
    settings: &ArchiveSettings,
    tally: &mut Tally,
    records: &mut Vec<Record>,
) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    for row in reader.records() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                tracing::debug!("Skipping malformed row: {}", e);
                continue;
            }
        };
        let field = |name: &str| columns.get(name).and_then(|&i| row.get(i)).map(str::trim);

        let (Some(office), Some(gender)) = (field("CD_CARGO"), field("CD_GENERO")) else {
            continue;
        };
        if office != COUNCIL_MEMBER_CODE {
            continue;
        }

        let situation = field("DS_SIT_TOT_TURNO").unwrap_or_default().to_uppercase();
        if !ELECTED_SITUATIONS.contains(&situation.as_str()) {
            continue;
        }

        match gender {
            MALE_CODE => {
                tally.men += 1;
                continue;
            }
            FEMALE_CODE => tally.women += 1,
            _ => {
                tally.others += 1;
                continue;
            }
        }

        let value = |name: &str| field(name).unwrap_or_default().to_string();

        let birth_state = value("SG_UF_NASCIMENTO");
        let birthplace = if birth_state.is_empty() {
            NOT_INFORMED.to_string()
        } else {
            let city = field("NM_MUNICIPIO_NASCIMENTO").unwrap_or(NOT_INFORMED);
            format!("{} - {}", city, birth_state)
        };

        let birth_date = value("DT_NASCIMENTO");
        let age = age_on(&birth_date, &settings.extracted_on)
            .map(|age| age.to_string())
            .unwrap_or_default();

        let mut email = value("DS_EMAIL").to_lowercase();
        if email.contains("não divulgável") {
            email = UNDISCLOSED_EMAIL.to_string();
        }

        records.push(
            Record::new()
                .with("nome", value("NM_URNA_CANDIDATO"))
                .with("nome_civil", value("NM_CANDIDATO"))
                .with("partido", value("SG_PARTIDO"))
                .with("uf", value("SG_UF"))
                .with("municipio", value("NM_UE"))
                .with("periodo_mandato", settings.term.as_str())
                .with("naturalidade", birthplace)
                .with("situacao", situation)
                .with("data_nascimento", birth_date)
                .with("idade", age)
                .with("grau_instrucao", value("DS_GRAU_INSTRUCAO"))
                .with("ocupacao", value("DS_OCUPACAO"))
                .with("estado_civil", value("DS_ESTADO_CIVIL"))
                .with("cor_raca", value("DS_COR_RACA"))
                .with("email", email)
                .with("fonte_dados", SOURCE_LABEL)
                .with("url_fonte", settings.source_url.as_str())
                .with("data_extracao", settings.extracted_on.as_str()),
        );
    }

    Ok(())
}

/// First `consulta_cand*.zip` resource of a CKAN `package_search` response.
pub fn find_archive_url(search_response: &serde_json::Value) -> Option<String> {
    search_response
        .pointer("/result/results")?
        .as_array()?
        .iter()
        .filter_map(|package| package.get("resources")?.as_array())
        .flatten()
        .filter_map(|resource| resource.get("url")?.as_str())
        .find(|url| {
            let lower = url.to_lowercase();
            lower.ends_with(".zip") && lower.contains("consulta_cand")
        })
        .map(str::to_string)
}

/// Archive URL from the open-data catalogue, or the configured fallback once a
/// HEAD request confirms it exists. Without a catalogue the configured URL is
/// used as given.
pub async fn resolve_archive_url(fetcher: &PageFetcher, config: &CouncillorsConfig) -> Result<String> {
    let Some(search_url) = &config.package_search_url else {
        return Ok(config.archive_url.clone());
    };

    if let Some(url) = search_catalogue(fetcher, search_url, &config.search_term).await {
        tracing::info!("✓ Archive URL found in catalogue: {}", url);
        return Ok(url);
    }

    tracing::warn!(
        "⚠️ Catalogue search inconclusive, trying fallback {}",
        config.archive_url
    );
    if fetcher.is_reachable(&config.archive_url).await {
        tracing::info!("✓ Fallback archive URL confirmed");
        Ok(config.archive_url.clone())
    } else {
        Err(EtlError::SourceUnavailable {
            url: config.archive_url.clone(),
            attempts: 1,
            reason: "catalogue search inconclusive and fallback archive unreachable".to_string(),
        })
    }
}

async fn search_catalogue(fetcher: &PageFetcher, search_url: &str, term: &str) -> Option<String> {
    let query = match url::Url::parse_with_params(search_url, &[("q", term), ("rows", "10")]) {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!("⚠️ Invalid package search URL {}: {}", search_url, e);
            return None;
        }
    };

    match fetcher.fetch_text(query.as_str()).await {
        FetchOutcome::Fetched(body) => serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .as_ref()
            .and_then(find_archive_url),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::HttpConfig;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;
    use std::io::Write;
    use zip::write::{FileOptions, ZipWriter};

    const HEADER: &str = "DT_GERACAO;SG_UF;NM_UE;CD_CARGO;NM_CANDIDATO;NM_URNA_CANDIDATO;SG_PARTIDO;CD_GENERO;DS_SIT_TOT_TURNO;DT_NASCIMENTO;NM_MUNICIPIO_NASCIMENTO;SG_UF_NASCIMENTO;DS_GRAU_INSTRUCAO;DS_OCUPACAO;DS_ESTADO_CIVIL;DS_COR_RACA;DS_EMAIL";

    fn latin1(text: &str) -> Vec<u8> {
        text.chars().map(|c| c as u32 as u8).collect()
    }

    fn sample_archive() -> Vec<u8> {
        let sp = [
            HEADER,
            "01/10/2024;SP;SÃO PAULO;13;ANA MARIA SOUZA;ANA DA SAÚDE;PT;4;ELEITO POR QP;02/05/1980;CAMPINAS;SP;SUPERIOR COMPLETO;MÉDICA;CASADA;BRANCA;NÃO DIVULGÁVEL",
            "01/10/2024;SP;SÃO PAULO;13;JOSE LIMA;ZÉ LIMA;PL;2;ELEITO;01/01/1970;SANTOS;SP;MÉDIO;COMERCIANTE;CASADO;PARDA;ze@example.com",
            "01/10/2024;SP;SÃO PAULO;13;BEATRIZ ROCHA;BIA;PSOL;4;SUPLENTE;01/01/1990;SANTOS;SP;MÉDIO;ESTUDANTE;SOLTEIRA;PRETA;bia@example.com",
            "01/10/2024;SP;SÃO PAULO;11;CARLA PREFEITA;CARLA;MDB;4;ELEITO;01/01/1965;SANTOS;SP;SUPERIOR;ADVOGADA;CASADA;BRANCA;carla@example.com",
        ]
        .join("\n");
        let rj = [
            HEADER,
            "01/10/2024;RJ;NITERÓI;13;DANIELA COSTA;DANI;PSD;4;Eleito por média;10/10/1985;;;SUPERIOR;PROFESSORA;SOLTEIRA;PARDA;DANI@EXAMPLE.COM",
            "01/10/2024;RJ;NITERÓI;13;ALEX NUNES;ALEX;NOVO;0;ELEITO;10/10/1985;NITERÓI;RJ;SUPERIOR;ENGENHEIRO;SOLTEIRO;BRANCA;alex@example.com",
        ]
        .join("\n");

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file::<_, ()>("leiame.pdf", FileOptions::default()).unwrap();
        zip.write_all(b"%PDF").unwrap();
        zip.start_file::<_, ()>("consulta_cand_2024_SP.csv", FileOptions::default())
            .unwrap();
        zip.write_all(&latin1(&sp)).unwrap();
        zip.start_file::<_, ()>("consulta_cand_2024_RJ.csv", FileOptions::default())
            .unwrap();
        zip.write_all(&latin1(&rj)).unwrap();
        zip.start_file::<_, ()>("consulta_cand_2024_BRASIL.csv", FileOptions::default())
            .unwrap();
        zip.write_all(&latin1(&sp)).unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn settings(states: &[&str]) -> ArchiveSettings {
        ArchiveSettings {
            source_url: "https://cdn.example.com/consulta_cand_2024.zip".to_string(),
            term: "2025-2028".to_string(),
            states: states.iter().map(|s| s.to_string()).collect(),
            extracted_on: "2024-11-05".to_string(),
        }
    }

    #[test]
    fn test_extracts_elected_women_and_counts_everyone_elected() {
        let extraction = extract_councillors(&sample_archive(), &settings(&[])).unwrap();

        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.stats.files_processed, 2);
        assert_eq!(extraction.stats.gender.women, 2);
        assert_eq!(extraction.stats.gender.men, 1);
        assert_eq!(extraction.stats.gender.others, 1);
        assert_eq!(extraction.stats.gender.total, 4);
        assert_eq!(extraction.stats.gender.women_percentage, 50.0);

        let ana = &extraction.records[0];
        assert_eq!(ana.text("nome"), "ANA DA SAÚDE");
        assert_eq!(ana.text("nome_civil"), "ANA MARIA SOUZA");
        assert_eq!(ana.text("municipio"), "SÃO PAULO");
        assert_eq!(ana.text("naturalidade"), "CAMPINAS - SP");
        assert_eq!(ana.text("situacao"), "ELEITO POR QP");
        assert_eq!(ana.text("email"), "Não divulgado");
        assert_eq!(ana.text("periodo_mandato"), "2025-2028");
        assert_eq!(ana.text("data_extracao"), "2024-11-05");
        assert_eq!(ana.text("idade"), "44");

        let dani = &extraction.records[1];
        assert_eq!(dani.text("situacao"), "ELEITO POR MÉDIA");
        assert_eq!(dani.text("naturalidade"), "Não Informado");
        assert_eq!(dani.text("email"), "dani@example.com");
        assert_eq!(dani.text("idade"), "39");
    }

    #[test]
    fn test_age_counts_completed_years() {
        assert_eq!(age_on("05/11/1980", "2024-11-05"), Some(44));
        assert_eq!(age_on("06/11/1980", "2024-11-05"), Some(43));
        assert_eq!(age_on("", "2024-11-05"), None);
        assert_eq!(age_on("1980-11-05", "2024-11-05"), None);
        assert_eq!(age_on("05/11/2030", "2024-11-05"), None);
    }

    #[test]
    fn test_state_allow_list_filters_entries() {
        let extraction = extract_councillors(&sample_archive(), &settings(&["RJ"])).unwrap();

        assert_eq!(extraction.records.len(), 1);
        assert_eq!(extraction.records[0].text("uf"), "RJ");
        assert_eq!(extraction.stats.files_processed, 1);
    }

    #[test]
    fn test_rows_without_office_or_gender_columns_are_skipped() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file::<_, ()>("consulta_cand_2024_AC.csv", FileOptions::default())
            .unwrap();
        zip.write_all(b"SG_UF;NM_URNA_CANDIDATO;DS_SIT_TOT_TURNO\nAC;FULANA;ELEITO\n")
            .unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let extraction = extract_councillors(&bytes, &settings(&[])).unwrap();
        assert!(extraction.records.is_empty());
        assert_eq!(extraction.stats.gender.total, 0);
    }

    #[test]
    fn test_entry_selection_and_state_codes() {
        let names = vec![
            "consulta_cand_2024_BRASIL.csv".to_string(),
            "Consulta_Cand_2024_MG.CSV".to_string(),
            "leiame.pdf".to_string(),
            "outros_2024_SP.csv".to_string(),
        ];
        let entries = candidate_entries(names);

        assert_eq!(entries, vec!["Consulta_Cand_2024_MG.CSV"]);
        assert_eq!(state_of_entry(&entries[0]), "MG");
    }

    #[test]
    fn test_invalid_archive_is_an_error() {
        assert!(extract_councillors(b"not a zip", &settings(&[])).is_err());
    }

    #[test]
    fn test_find_archive_url_in_catalogue_response() {
        let response = serde_json::json!({
            "result": {"results": [
                {"resources": [{"url": "https://cdn.example.com/leiame.pdf"}]},
                {"resources": [
                    {"url": "https://cdn.example.com/bem_candidato_2024.zip"},
                    {"url": "https://cdn.example.com/consulta_cand_2024.zip"}
                ]}
            ]}
        });

        assert_eq!(
            find_archive_url(&response).as_deref(),
            Some("https://cdn.example.com/consulta_cand_2024.zip")
        );
        assert_eq!(find_archive_url(&serde_json::json!({"result": {}})), None);
    }

    fn fast_fetcher() -> PageFetcher {
        PageFetcher::new(&HttpConfig {
            request_delay_ms: 0,
            max_retries: 0,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_confirmed_archive_url() {
        let server = MockServer::start_async().await;
        let search = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/3/action/package_search")
                    .query_param("rows", "10");
                then.status(503);
            })
            .await;
        let head = server
            .mock_async(|when, then| {
                when.method(HEAD).path("/consulta_cand_2024.zip");
                then.status(200);
            })
            .await;

        let config = CouncillorsConfig {
            package_search_url: Some(server.url("/api/3/action/package_search")),
            archive_url: server.url("/consulta_cand_2024.zip"),
            ..CouncillorsConfig::default()
        };

        let url = resolve_archive_url(&fast_fetcher(), &config).await.unwrap();

        search.assert_async().await;
        head.assert_async().await;
        assert_eq!(url, server.url("/consulta_cand_2024.zip"));
    }

    #[tokio::test]
    async fn test_unreachable_fallback_is_source_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/3/action/package_search");
                then.status(200).json_body(serde_json::json!({"result": {"results": []}}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/consulta_cand_2024.zip");
                then.status(404);
            })
            .await;

        let config = CouncillorsConfig {
            package_search_url: Some(server.url("/api/3/action/package_search")),
            archive_url: server.url("/consulta_cand_2024.zip"),
            ..CouncillorsConfig::default()
        };

        let result = resolve_archive_url(&fast_fetcher(), &config).await;

        assert!(matches!(result, Err(EtlError::SourceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_resolve_uses_catalogue_result() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/3/action/package_search");
                then.status(200).json_body(serde_json::json!({
                    "result": {"results": [{"resources": [
                        {"url": "https://cdn.example.com/consulta_cand_2024.zip"}
                    ]}]}
                }));
            })
            .await;

        let config = CouncillorsConfig {
            package_search_url: Some(server.url("/api/3/action/package_search")),
            ..CouncillorsConfig::default()
        };

        assert_eq!(
            resolve_archive_url(&fast_fetcher(), &config).await.unwrap(),
            "https://cdn.example.com/consulta_cand_2024.zip"
        );
    }
}
