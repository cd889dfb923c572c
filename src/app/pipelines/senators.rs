//! Sitting female senators from the Senado's "por sexo" table.

use crate::app::pipelines::{now_timestamp, write_outputs};
use crate::config::toml_config::AppConfig;
use crate::core::flatfile::{to_pretty_json, write_csv};
use crate::core::http::PageFetcher;
use crate::core::profile::{enrich_profiles, ProfileExtractor, ProfileOptions};
use crate::core::selectors::{element_text, parse_selector};
use crate::core::stats::{distribution, log_top};
use crate::domain::model::{GenderStats, OutputFile, Record, Role, TransformResult};
use crate::domain::ports::{Pipeline, Storage};
use crate::utils::error::Result;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const SOURCE_LABEL: &str = "Web Scraping HTML";
const EXTRACTION_METHOD: &str = "Scraper - Senado Federal (filtro por sexo)";

/// Profile details merged into a senator's row. The table already carries
/// party, state, term, phones and email.
pub const SENATE_PROFILE_FIELDS: &[&str] = &[
    "nome_civil",
    "data_nascimento",
    "naturalidade",
    "profissao",
    "formacao",
    "numero_mandatos",
    "comissoes",
    "biografia_resumida",
];

/// Cells of a female row: name (linked), party, state, term, phones, email.
const FEMALE_ROW_CELLS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Female,
    Male,
}

#[derive(Debug, Clone, Default)]
pub struct SenateTable {
    pub women: Vec<Record>,
    pub men: usize,
}

pub struct SenateTableParser {
    table: Selector,
    rows: Selector,
    cells: Selector,
    link: Selector,
}

impl SenateTableParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            table: parse_selector("table")?,
            rows: parse_selector("tr")?,
            cells: parse_selector("td")?,
            link: parse_selector("a")?,
        })
    }

    /// Rows are split into sections by rows whose whole text is `Feminino` or
    /// `Masculino`. Only the first table of the page is read.
    pub fn parse(&self, html: &str, page_url: &str) -> SenateTable {
        let document = Html::parse_document(html);
        let mut table = SenateTable::default();

        let Some(listing) = document.select(&self.table).next() else {
            tracing::warn!("✗ No table found on {}", page_url);
            return table;
        };

        let mut section = Section::Preamble;
        for row in listing.select(&self.rows) {
            match element_text(row).as_str() {
                "Feminino" => {
                    section = Section::Female;
                    continue;
                }
                "Masculino" => {
                    section = Section::Male;
                    continue;
                }
                _ => {}
            }

            let cells: Vec<_> = row.select(&self.cells).collect();
            if cells.len() < 2 {
                continue;
            }
            let link = cells[0].select(&self.link).next();

            match (section, link) {
                (Section::Female, Some(link)) if cells.len() >= FEMALE_ROW_CELLS => {
                    let href = link.value().attr("href").unwrap_or_default();
                    let text = |index: usize| element_text(cells[index]);

                    let record = Record::new()
                        .with("nome", element_text(link))
                        .with("partido", text(1))
                        .with("uf", text(2))
                        .with("periodo_mandato", text(3))
                        .with("telefones", text(4))
                        .with("email", text(5))
                        .with("link_perfil", absolute_link(page_url, href))
                        .with("fonte_dados", SOURCE_LABEL)
                        .with("url_fonte", page_url)
                        .with("metodo_extracao", EXTRACTION_METHOD);
                    tracing::info!(
                        "✓ Senator found: {} ({}-{})",
                        record.text("nome"),
                        record.text("partido"),
                        record.text("uf")
                    );
                    table.women.push(record);
                }
                (Section::Male, Some(_)) => table.men += 1,
                _ => {}
            }
        }

        table
    }
}

fn absolute_link(page_url: &str, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

pub struct SenatorsPipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) output_dir: String,
    listing_url: String,
    fetcher: PageFetcher,
    parser: SenateTableParser,
    profiles: Option<(ProfileExtractor, Duration)>,
    extracted_at: Option<String>,
}

impl<S: Storage> SenatorsPipeline<S> {
    pub fn new(storage: S, config: &AppConfig) -> Result<Self> {
        let senators = &config.senators;
        let profiles = if senators.fetch_profiles {
            let extractor = ProfileExtractor::new(ProfileOptions {
                party_and_state: false,
                email_domain: None,
                fields: Some(SENATE_PROFILE_FIELDS),
            })?;
            Some((extractor, Duration::from_millis(senators.profile_delay_ms)))
        } else {
            None
        };

        Ok(Self {
            storage,
            output_dir: config.output.directory.clone(),
            listing_url: senators.listing_url.clone(),
            fetcher: PageFetcher::new(&config.http)?,
            parser: SenateTableParser::new()?,
            profiles,
            extracted_at: None,
        })
    }

    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.extracted_at = Some(timestamp.to_string());
        self
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for SenatorsPipeline<S> {
    type Extracted = SenateTable;

    fn name(&self) -> &str {
        "senators"
    }

    async fn extract(&self) -> Result<SenateTable> {
        tracing::info!("Requesting {}", self.listing_url);
        let html = self
            .fetcher
            .fetch_text(&self.listing_url)
            .await
            .into_result(&self.listing_url)?;

        let SenateTable { mut women, men } = self.parser.parse(&html, &self.listing_url);
        tracing::info!("📊 Table read: {} women and {} men", women.len(), men);

        let timestamp = self.extracted_at.clone().unwrap_or_else(now_timestamp);
        for record in &mut women {
            record.set("data_extracao", timestamp.as_str());
        }

        let women = match &self.profiles {
            Some((extractor, delay)) if !women.is_empty() => {
                tracing::info!("🔎 Collecting {} profile pages", women.len());
                enrich_profiles(&self.fetcher, extractor, women, *delay).await
            }
            _ => women,
        };

        Ok(SenateTable { women, men })
    }

    async fn transform(&self, table: SenateTable) -> Result<TransformResult> {
        let role = Role::FederalSenator;
        let stats = GenderStats::new(table.women.len(), table.men, 0);
        tracing::info!(
            "{} women out of {} senators ({:.2}%)",
            stats.women,
            stats.total,
            stats.women_percentage
        );

        let parties: Vec<String> = table.women.iter().map(|r| r.text("partido")).collect();
        log_top("Senators by party", &distribution(parties.iter().map(String::as_str)), 10);

        Ok(TransformResult {
            record_count: table.women.len(),
            outputs: vec![
                OutputFile {
                    path: role.csv_file(),
                    contents: write_csv(&table.women, role.csv_fields())?,
                },
                OutputFile {
                    path: role.stats_file(),
                    contents: to_pretty_json(&stats)?,
                },
            ],
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        write_outputs(&self.storage, &self.output_dir, &result).await
    }
}
