//! Female federal deputies from the Câmara's paginated search results.

use crate::app::pipelines::{now_timestamp, write_outputs};
use crate::config::toml_config::{AppConfig, DeputiesConfig};
use crate::core::flatfile::{to_pretty_json, write_csv};
use crate::core::http::{FetchOutcome, PageFetcher};
use crate::core::normalize::strip_listing_suffix;
use crate::core::pagination::{PaginatedCollector, PaginationSettings};
use crate::core::profile::{enrich_profiles, ProfileExtractor, ProfileOptions};
use crate::core::selectors::{collapse_whitespace, element_text, parse_selector, SelectorChain};
use crate::core::stats::{distribution, log_top};
use crate::domain::model::{GenderStats, OutputFile, Record, Role, TransformResult};
use crate::domain::ports::{FragmentParser, Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use url::Url;

const SOURCE_LABEL: &str = "Web Scraping HTML";
const EXTRACTION_METHOD: &str = "Scraper - Câmara dos Deputados (filtro sexo=F)";

/// Listing text that is navigation, not a name.
const UNWANTED_NAME_PHRASES: &[&str] = &[
    "pesquise",
    "deputado",
    "filtro",
    "buscar",
    "resultado",
    "página",
    "menu",
    "navegação",
    "ver mais",
    "clique",
];

/// A usable deputy name, or `None` for navigation text and noise.
pub fn clean_name(raw: &str) -> Option<String> {
    let name = strip_listing_suffix(&collapse_whitespace(raw));
    let lower = name.to_lowercase();

    if UNWANTED_NAME_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
    {
        return None;
    }

    let length = name.chars().count();
    if !(3..=100).contains(&length) || !name.chars().any(char::is_alphabetic) {
        return None;
    }

    Some(name)
}

pub struct DeputyListingParser {
    containers: SelectorChain,
    fallback: Selector,
    fallback_limit: usize,
    names: SelectorChain,
    links: Selector,
}

impl DeputyListingParser {
    pub fn new(config: &DeputiesConfig) -> Result<Self> {
        Ok(Self {
            containers: SelectorChain::parse(&config.container_selectors)?,
            fallback: parse_selector(&config.fallback_selector)?,
            fallback_limit: config.fallback_limit,
            names: SelectorChain::parse(&config.name_selectors)?,
            links: parse_selector("a[href]")?,
        })
    }

    fn fragment(&self, element: ElementRef<'_>, page_url: &str) -> Option<Record> {
        let raw_name = self.names.first_text(element).or_else(|| {
            let own = element_text(element);
            (own.chars().count() > 1).then_some(own)
        })?;
        let name = clean_name(&raw_name)?;

        Some(
            Record::new()
                .with("nome", name)
                .with("partido", "")
                .with("uf", "")
                .with("link_perfil", self.profile_link(element, page_url))
                .with("fonte_dados", SOURCE_LABEL)
                .with("url_fonte", page_url)
                .with("metodo_extracao", EXTRACTION_METHOD),
        )
    }

    /// Absolute URL of the fragment's first link, kept only when it points at a
    /// deputy page.
    fn profile_link(&self, element: ElementRef<'_>, page_url: &str) -> String {
        let own_href = (element.value().name() == "a")
            .then(|| element.value().attr("href"))
            .flatten();
        let href = own_href.or_else(|| {
            element
                .select(&self.links)
                .next()
                .and_then(|link| link.value().attr("href"))
        });

        let Some(href) = href.filter(|href| href.contains("/deputados/")) else {
            return String::new();
        };

        Url::parse(page_url)
            .and_then(|base| base.join(href))
            .map(String::from)
            .unwrap_or_else(|_| href.to_string())
    }
}

impl FragmentParser for DeputyListingParser {
    fn parse_fragments(&self, html: &str, page_url: &str) -> Vec<Record> {
        let document = Html::parse_document(html);

        let matched = self.containers.first_yielding(|selector| {
            document
                .select(selector)
                .filter_map(|element| self.fragment(element, page_url))
                .collect()
        });
        if let Some((selector, records)) = matched {
            tracing::debug!("{} fragments via '{}'", records.len(), selector);
            return records;
        }

        document
            .select(&self.fallback)
            .take(self.fallback_limit)
            .filter_map(|element| self.fragment(element, page_url))
            .collect()
    }
}

/// Reads the "N encontrados" counter of a listing page.
pub struct ResultCounter {
    numbers: Regex,
}

impl ResultCounter {
    const MARKER: &'static str = "encontrados";

    pub fn new() -> Result<Self> {
        let numbers = Regex::new(r"\d[\d.]*").map_err(|e| EtlError::ProcessingError {
            message: format!("Invalid counter pattern: {}", e),
        })?;
        Ok(Self { numbers })
    }

    /// Largest number next to the first mention of the marker. Falls back to the
    /// enclosing element when the number sits in a sibling tag.
    pub fn count(&self, html: &str) -> Option<usize> {
        let document = Html::parse_document(html);

        for node in document.root_element().descendants() {
            let Some(text) = node.value().as_text() else {
                continue;
            };
            if !text.to_lowercase().contains(Self::MARKER) {
                continue;
            }

            let count = self.largest_number(text).or_else(|| {
                node.parent()
                    .and_then(ElementRef::wrap)
                    .and_then(|parent| self.largest_number(&element_text(parent)))
            });
            if count.is_some() {
                return count;
            }
        }
        None
    }

    fn largest_number(&self, text: &str) -> Option<usize> {
        self.numbers
            .find_iter(text)
            .filter_map(|m| m.as_str().replace('.', "").parse().ok())
            .max()
    }
}

struct MenCount {
    url: String,
    fallback: usize,
    counter: ResultCounter,
}

/// Listing records plus the men counted on the Câmara site, when requested.
#[derive(Debug, Clone)]
pub struct DeputiesExtraction {
    pub records: Vec<Record>,
    pub men: Option<usize>,
}

pub struct DeputiesPipeline<S: Storage> {
    pub(crate) storage: S,
    pub(crate) output_dir: String,
    fetcher: PageFetcher,
    collector: PaginatedCollector<DeputyListingParser>,
    profiles: Option<(ProfileExtractor, Duration)>,
    men_count: Option<MenCount>,
    extracted_at: Option<String>,
}

impl<S: Storage> DeputiesPipeline<S> {
    pub fn new(storage: S, config: &AppConfig) -> Result<Self> {
        let deputies = &config.deputies;
        let collector = PaginatedCollector::new(
            PaginationSettings::from(deputies),
            DeputyListingParser::new(deputies)?,
        );

        let profiles = if deputies.fetch_profiles {
            let extractor = ProfileExtractor::new(ProfileOptions {
                party_and_state: true,
                email_domain: deputies.email_domain.clone(),
                fields: None,
            })?;
            Some((extractor, Duration::from_millis(deputies.profile_delay_ms)))
        } else {
            None
        };

        let men_count = if deputies.men_count_url.is_empty() {
            None
        } else {
            Some(MenCount {
                url: deputies.men_count_url.clone(),
                fallback: deputies.men_count_fallback,
                counter: ResultCounter::new()?,
            })
        };

        Ok(Self {
            storage,
            output_dir: config.output.directory.clone(),
            fetcher: PageFetcher::new(&config.http)?,
            collector,
            profiles,
            men_count,
            extracted_at: None,
        })
    }

    async fn count_men(&self, source: &MenCount) -> usize {
        self.fetcher.pause().await;
        let counted = match self.fetcher.fetch_text(&source.url).await {
            FetchOutcome::Fetched(html) => source.counter.count(&html),
            FetchOutcome::NotFound => None,
            FetchOutcome::Abandoned { reason, .. } => {
                tracing::warn!("⚠️ Men counter unavailable: {}", reason);
                None
            }
        };

        match counted {
            Some(men) => {
                tracing::info!("✓ {} male deputies counted", men);
                men
            }
            None => {
                tracing::warn!("⚠️ Men counter not found, using {}", source.fallback);
                source.fallback
            }
        }
    }

    /// Fixes the `data_extracao` stamp instead of reading the clock.
    pub fn with_timestamp(mut self, timestamp: &str) -> Self {
        self.extracted_at = Some(timestamp.to_string());
        self
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for DeputiesPipeline<S> {
    type Extracted = DeputiesExtraction;

    fn name(&self) -> &str {
        "deputies"
    }

    async fn extract(&self) -> Result<DeputiesExtraction> {
        let report = self.collector.collect(&self.fetcher).await?;
        if !report.pages_abandoned.is_empty() {
            tracing::warn!(
                "⚠️ Pages skipped after retries: {:?}",
                report.pages_abandoned
            );
        }

        let timestamp = self.extracted_at.clone().unwrap_or_else(now_timestamp);
        let mut records = report.records;
        for record in &mut records {
            record.set("data_extracao", timestamp.as_str());
        }

        let records = match &self.profiles {
            Some((extractor, delay)) if !records.is_empty() => {
                tracing::info!("🔎 Collecting {} profile pages", records.len());
                enrich_profiles(&self.fetcher, extractor, records, *delay).await
            }
            _ => records,
        };

        let men = match &self.men_count {
            Some(source) => Some(self.count_men(source).await),
            None => None,
        };

        Ok(DeputiesExtraction { records, men })
    }

    async fn transform(&self, extraction: DeputiesExtraction) -> Result<TransformResult> {
        let role = Role::FederalDeputy;
        let DeputiesExtraction { records, men } = extraction;
        let contents = write_csv(&records, role.csv_fields())?;

        let parties: Vec<String> = records.iter().map(|r| r.text("partido")).collect();
        let states: Vec<String> = records.iter().map(|r| r.text("uf")).collect();
        log_top("Deputies by party", &distribution(parties.iter().map(String::as_str)), 10);
        log_top("Deputies by state", &distribution(states.iter().map(String::as_str)), 10);

        let mut outputs = vec![OutputFile {
            path: role.csv_file(),
            contents,
        }];
        if let Some(men) = men {
            let stats = GenderStats::new(records.len(), men, 0);
            tracing::info!(
                "{} women out of {} deputies ({:.2}%)",
                stats.women,
                stats.total,
                stats.women_percentage
            );
            outputs.push(OutputFile {
                path: role.stats_file(),
                contents: to_pretty_json(&stats)?,
            });
        }

        Ok(TransformResult {
            record_count: records.len(),
            outputs,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        write_outputs(&self.storage, &self.output_dir, &result).await
    }
}
