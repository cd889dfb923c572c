//! Sequential collection over a paginated HTML listing.
//!
//! Termination signals, in the order they are checked for each page:
//! - HTTP 404 for the page URL;
//! - an end-of-results phrase in the page text;
//! - a second consecutive page without fragments;
//! - `max_consecutive_failures` abandoned pages in a row;
//! - `max_pages` pages visited.
//!
//! The end-of-results phrases are literal text matched against the remote
//! site's wording. A rewording on the site silently disables that signal and
//! the empty-page rule becomes the only stop.

use crate::config::toml_config::DeputiesConfig;
use crate::core::http::{FetchOutcome, PageFetcher};
use crate::core::selectors::document_text;
use crate::domain::model::Record;
use crate::domain::ports::FragmentParser;
use crate::utils::error::{EtlError, Result};
use scraper::Html;
use url::Url;

/// Consecutive fragment-less pages that end a run.
const EMPTY_PAGES_TO_STOP: u32 = 2;

#[derive(Debug, Clone)]
pub struct PaginationSettings {
    pub listing_url: String,
    pub page_parameter: String,
    pub first_page: u32,
    pub max_pages: u32,
    pub max_consecutive_failures: u32,
    pub end_markers: Vec<String>,
}

impl From<&DeputiesConfig> for PaginationSettings {
    fn from(config: &DeputiesConfig) -> Self {
        Self {
            listing_url: config.listing_url.clone(),
            page_parameter: config.page_parameter.clone(),
            first_page: config.first_page,
            max_pages: config.max_pages,
            max_consecutive_failures: config.max_consecutive_failures,
            end_markers: config.end_markers.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndMarker { page: u32 },
    EmptyPages { page: u32 },
    NotFound { page: u32 },
    TooManyFailures { page: u32 },
    PageLimit,
}

#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub records: Vec<Record>,
    /// HTTP requests sent, retries included.
    pub requests: usize,
    pub pages_visited: u32,
    pub pages_abandoned: Vec<u32>,
    pub stop_reason: StopReason,
}

pub struct PaginatedCollector<P: FragmentParser> {
    settings: PaginationSettings,
    parser: P,
}

impl<P: FragmentParser> PaginatedCollector<P> {
    pub fn new(settings: PaginationSettings, parser: P) -> Self {
        Self { settings, parser }
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// URL of `page`: the listing URL with the page parameter set (or replaced).
    pub fn page_url(&self, page: u32) -> Result<String> {
        let mut url = Url::parse(&self.settings.listing_url).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "listing_url".to_string(),
                value: self.settings.listing_url.clone(),
                reason: e.to_string(),
            }
        })?;

        let param = self.settings.page_parameter.as_str();
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != param)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(param, &page.to_string());

        Ok(url.into())
    }

    pub async fn collect(&self, fetcher: &PageFetcher) -> Result<CollectionReport> {
        let requests_before = fetcher.requests_made();
        let first = self.settings.first_page;
        let last = first.saturating_add(self.settings.max_pages.saturating_sub(1));

        let mut records = Vec::new();
        let mut pages_abandoned = Vec::new();
        let mut pages_visited = 0;
        let mut empty_streak = 0;
        let mut failure_streak = 0;
        let mut stop_reason = StopReason::PageLimit;

        for page in first..=last {
            if page != first {
                fetcher.pause().await;
            }

            let url = self.page_url(page)?;
            pages_visited += 1;
            tracing::info!("[Page {}] Requesting {}", page, url);

            let html = match fetcher.fetch_text(&url).await {
                FetchOutcome::Fetched(html) => html,
                FetchOutcome::NotFound => {
                    tracing::info!("[Page {}] ✓ Page does not exist (404), end of listing", page);
                    stop_reason = StopReason::NotFound { page };
                    break;
                }
                FetchOutcome::Abandoned { attempts, reason } => {
                    tracing::warn!(
                        "[Page {}] ✗ Skipped after {} attempt(s): {}",
                        page,
                        attempts,
                        reason
                    );
                    pages_abandoned.push(page);
                    failure_streak += 1;
                    if failure_streak >= self.settings.max_consecutive_failures {
                        tracing::warn!(
                            "⚠️ Pagination interrupted after {} consecutive failures",
                            failure_streak
                        );
                        stop_reason = StopReason::TooManyFailures { page };
                        break;
                    }
                    continue;
                }
            };
            failure_streak = 0;

            if is_end_of_results(&html, &self.settings.end_markers) {
                tracing::info!("[Page {}] ✓ End-of-results marker found", page);
                stop_reason = StopReason::EndMarker { page };
                break;
            }

            let fragments = self.parser.parse_fragments(&html, &url);
            if fragments.is_empty() {
                empty_streak += 1;
                tracing::warn!("[Page {}] No records extracted", page);
                if empty_streak >= EMPTY_PAGES_TO_STOP {
                    stop_reason = StopReason::EmptyPages { page };
                    break;
                }
            } else {
                empty_streak = 0;
                tracing::info!("[Page {}] ✓ {} records", page, fragments.len());
                records.extend(fragments);
            }
        }

        let requests = fetcher.requests_made() - requests_before;
        tracing::info!(
            "📊 Collected {} records from {} pages ({} requests, stop: {:?})",
            records.len(),
            pages_visited,
            requests,
            stop_reason
        );

        Ok(CollectionReport {
            records,
            requests,
            pages_visited,
            pages_abandoned,
            stop_reason,
        })
    }
}

/// Whether the page text contains one of the (lowercase) end-of-results phrases.
pub fn is_end_of_results(html: &str, markers: &[String]) -> bool {
    if markers.is_empty() {
        return false;
    }
    let text = document_text(&Html::parse_document(html)).to_lowercase();
    markers
        .iter()
        .any(|marker| text.contains(&marker.to_lowercase()))
}
