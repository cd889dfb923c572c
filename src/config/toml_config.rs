use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "mulheres-politica.toml";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Every job runs without a config file; a file only overrides the built-in values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub output: OutputConfig,
    pub http: HttpConfig,
    pub deputies: DeputiesConfig,
    pub senators: SenatorsConfig,
    pub councillors: CouncillorsConfig,
    pub consolidation: ConsolidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub timeout_seconds: u64,
    /// Pause between consecutive requests, and before each retry.
    pub request_delay_ms: u64,
    /// Retries after the first attempt before a page is abandoned.
    pub max_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            accept: "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
            accept_language: "pt-BR,pt;q=0.9,en;q=0.8".to_string(),
            timeout_seconds: 15,
            request_delay_ms: 2000,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeputiesConfig {
    pub listing_url: String,
    pub page_parameter: String,
    pub first_page: u32,
    pub max_pages: u32,
    pub max_consecutive_failures: u32,
    /// Lowercase phrases whose presence marks the page after the last result.
    pub end_markers: Vec<String>,
    pub container_selectors: Vec<String>,
    pub fallback_selector: String,
    pub fallback_limit: usize,
    pub name_selectors: Vec<String>,
    pub fetch_profiles: bool,
    pub profile_delay_ms: u64,
    pub email_domain: Option<String>,
    /// Listing filtered to men, read only for its result counter; empty skips it.
    pub men_count_url: String,
    /// Men count recorded when the counter cannot be read.
    pub men_count_fallback: usize,
}

impl Default for DeputiesConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www.camara.leg.br/deputados/quem-sao/resultado?search=&partido=&uf=&legislatura=&sexo=F".to_string(),
            page_parameter: "pagina".to_string(),
            first_page: 1,
            max_pages: 100,
            max_consecutive_failures: 3,
            end_markers: vec![
                "nenhuma ocorrência encontrada".to_string(),
                "nenhum resultado encontrado".to_string(),
                "não foram encontrados resultados".to_string(),
                "sua pesquisa não retornou resultados".to_string(),
                "não há deputados".to_string(),
            ],
            container_selectors: vec![
                ".card-deputado, .card-resultado, .deputado-resultado".to_string(),
                "ul.lista-deputados li, .lista-resultados li".to_string(),
                "table.resultados tr, .tabela-deputados tr".to_string(),
                r#"div[class*="deputado"]"#.to_string(),
                r#"a[href*="/deputados/"][href*="/perfil"]"#.to_string(),
            ],
            fallback_selector: r#"a[href*="/deputados/"]"#.to_string(),
            fallback_limit: 50,
            name_selectors: [
                ".nome-deputado",
                ".nome-resultado",
                ".deputado-nome",
                ".card-title",
                ".resultado-nome",
                ".nome-parlamentar",
                "h1",
                "h2",
                "h3",
                "h4",
                "h5",
                r#"a[href*="/deputados/"]"#,
                "a.nome",
                "a strong",
                "strong",
                "b",
                "td:first-child",
                "th:first-child",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fetch_profiles: true,
            profile_delay_ms: 1000,
            email_domain: Some("camara.leg.br".to_string()),
            men_count_url: "https://www.camara.leg.br/deputados/quem-sao/resultado?search=&partido=&uf=&legislatura=&sexo=M".to_string(),
            men_count_fallback: 4631,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenatorsConfig {
    pub listing_url: String,
    pub fetch_profiles: bool,
    pub profile_delay_ms: u64,
}

impl Default for SenatorsConfig {
    fn default() -> Self {
        Self {
            listing_url: "https://www25.senado.leg.br/web/senadores/em-exercicio/-/e/por-sexo"
                .to_string(),
            fetch_profiles: true,
            profile_delay_ms: 1500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncillorsConfig {
    pub archive_url: String,
    /// CKAN search endpoint tried before `archive_url`.
    pub package_search_url: Option<String>,
    pub search_term: String,
    /// A previously downloaded archive; takes precedence over any download.
    pub archive_path: Option<String>,
    /// Two-letter state codes to keep; empty keeps every state.
    pub states: Vec<String>,
    pub term: String,
    pub download_timeout_seconds: u64,
    /// IBGE localities endpoint used to add region columns; empty skips it.
    pub municipalities_url: Option<String>,
}

impl Default for CouncillorsConfig {
    fn default() -> Self {
        Self {
            archive_url:
                "https://cdn.tse.jus.br/estatistica/sead/odsele/consulta_cand/consulta_cand_2024.zip"
                    .to_string(),
            package_search_url: Some(
                "https://dadosabertos.tse.jus.br/api/3/action/package_search".to_string(),
            ),
            search_term: "consulta candidatos 2024".to_string(),
            archive_path: None,
            states: Vec::new(),
            term: "2025-2028".to_string(),
            download_timeout_seconds: 300,
            municipalities_url: Some(
                "https://servicodados.ibge.gov.br/api/v1/localidades/municipios".to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    pub output_file: String,
    pub project: String,
    pub description: String,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            output_file: "mulheres_politica_consolidado.json".to_string(),
            project: "Mulheres na Política Brasileira".to_string(),
            description: "Dados consolidados de deputadas, senadoras e vereadoras brasileiras"
                .to_string(),
        }
    }
}

impl AppConfig {
    /// Reads a TOML file, expanding `${VAR}` references first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Explicit path, else `mulheres-politica.toml` in the working directory, else defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Replaces `${VAR}` with the variable's value; unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("output.directory", &self.output.directory)?;

        validation::validate_non_empty_string("http.user_agent", &self.http.user_agent)?;
        validation::validate_range("http.timeout_seconds", self.http.timeout_seconds, 1, 600)?;
        validation::validate_range("http.max_retries", self.http.max_retries, 0, 10)?;

        let deputies = &self.deputies;
        validation::validate_url("deputies.listing_url", &deputies.listing_url)?;
        validation::validate_non_empty_string("deputies.page_parameter", &deputies.page_parameter)?;
        validation::validate_positive_number("deputies.max_pages", deputies.max_pages as usize, 1)?;
        validation::validate_positive_number(
            "deputies.max_consecutive_failures",
            deputies.max_consecutive_failures as usize,
            1,
        )?;
        validation::validate_selectors("deputies.container_selectors", &deputies.container_selectors)?;
        validation::validate_selectors("deputies.name_selectors", &deputies.name_selectors)?;
        validation::validate_selectors(
            "deputies.fallback_selector",
            std::slice::from_ref(&deputies.fallback_selector),
        )?;

        if !deputies.men_count_url.is_empty() {
            validation::validate_url("deputies.men_count_url", &deputies.men_count_url)?;
        }

        validation::validate_url("senators.listing_url", &self.senators.listing_url)?;

        let councillors = &self.councillors;
        validation::validate_url("councillors.archive_url", &councillors.archive_url)?;
        if let Some(search) = &councillors.package_search_url {
            validation::validate_url("councillors.package_search_url", search)?;
        }
        if let Some(url) = councillors.municipalities_url.as_deref().filter(|u| !u.is_empty()) {
            validation::validate_url("councillors.municipalities_url", url)?;
        }
        if let Some(path) = &councillors.archive_path {
            validation::validate_path("councillors.archive_path", path)?;
        }
        for state in &councillors.states {
            if state.chars().count() != 2 {
                return Err(EtlError::InvalidConfigValueError {
                    field: "councillors.states".to_string(),
                    value: state.clone(),
                    reason: "State codes have exactly two letters".to_string(),
                });
            }
        }

        validation::validate_path("consolidation.output_file", &self.consolidation.output_file)?;

        Ok(())
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output.directory, "data");
        assert_eq!(config.deputies.page_parameter, "pagina");
        assert_eq!(config.http.request_delay_ms, 2000);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
[output]
directory = "./saida"

[http]
request_delay_ms = 0
max_retries = 1

[councillors]
states = ["SP", "RJ"]
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.output.directory, "./saida");
        assert_eq!(config.http.request_delay_ms, 0);
        assert_eq!(config.http.max_retries, 1);
        assert_eq!(config.http.timeout_seconds, 15);
        assert_eq!(config.councillors.states, vec!["SP", "RJ"]);
        assert_eq!(config.councillors.term, "2025-2028");
        assert_eq!(config.deputies.max_pages, 100);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("MP_TEST_LISTING_URL", "https://listing.example.com/resultado");

        let toml_content = r#"
[deputies]
listing_url = "${MP_TEST_LISTING_URL}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(
            config.deputies.listing_url,
            "https://listing.example.com/resultado"
        );

        std::env::remove_var("MP_TEST_LISTING_URL");
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let bad_url = AppConfig::from_toml_str(
            r#"
[senators]
listing_url = "invalid-url"
"#,
        )
        .unwrap();
        assert!(bad_url.validate().is_err());

        let bad_selector = AppConfig::from_toml_str(
            r#"
[deputies]
container_selectors = ["div[["]
"#,
        )
        .unwrap();
        assert!(matches!(
            bad_selector.validate(),
            Err(EtlError::SelectorError { .. })
        ));

        let bad_state = AppConfig::from_toml_str(
            r#"
[councillors]
states = ["SPX"]
"#,
        )
        .unwrap();
        assert!(bad_state.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[consolidation]\noutput_file = \"tudo.json\"\n")
            .unwrap();

        let config = AppConfig::load(temp_file.path().to_str()).unwrap();
        assert_eq!(config.consolidation.output_file, "tudo.json");
    }
}
