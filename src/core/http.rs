use crate::config::toml_config::HttpConfig;
use crate::utils::error::{EtlError, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Result of fetching one URL under the retry policy.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Fetched(T),
    /// HTTP 404; never retried.
    NotFound,
    /// Every attempt failed with a network error or a non-success status.
    Abandoned { attempts: u32, reason: String },
}

impl<T> FetchOutcome<T> {
    /// For sources with a single resource, where anything but a body is fatal.
    pub fn into_result(self, url: &str) -> Result<T> {
        match self {
            FetchOutcome::Fetched(body) => Ok(body),
            FetchOutcome::NotFound => Err(EtlError::SourceUnavailable {
                url: url.to_string(),
                attempts: 1,
                reason: "HTTP 404 Not Found".to_string(),
            }),
            FetchOutcome::Abandoned { attempts, reason } => Err(EtlError::SourceUnavailable {
                url: url.to_string(),
                attempts,
                reason,
            }),
        }
    }
}

/// How a successful response body is read.
pub trait ResponseBody: Sized + Send {
    fn read(response: Response) -> impl Future<Output = reqwest::Result<Self>> + Send;
}

impl ResponseBody for Vec<u8> {
    fn read(response: Response) -> impl Future<Output = reqwest::Result<Self>> + Send {
        async move { response.bytes().await.map(|body| body.to_vec()) }
    }
}

/// Decoded with the charset declared in `Content-Type`, UTF-8 otherwise.
impl ResponseBody for String {
    fn read(response: Response) -> impl Future<Output = reqwest::Result<Self>> + Send {
        async move { response.text().await }
    }
}

/// Sequential HTTP client shared by every collector: browser-like headers, a fixed
/// pause between requests and a bounded number of retries per URL.
pub struct PageFetcher {
    client: Client,
    delay: Duration,
    max_retries: u32,
    requests: AtomicUsize,
}

impl PageFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::with_timeout(config, Duration::from_secs(config.timeout_seconds))
    }

    pub fn with_timeout(config: &HttpConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header_value("http.accept", &config.accept)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header_value("http.accept_language", &config.accept_language)?,
        );

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            delay: Duration::from_millis(config.request_delay_ms),
            max_retries: config.max_retries,
            requests: AtomicUsize::new(0),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub async fn pause(&self) {
        pause_for(self.delay).await;
    }

    /// Requests sent so far, retries included.
    pub fn requests_made(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    pub async fn fetch_bytes(&self, url: &str) -> FetchOutcome<Vec<u8>> {
        self.fetch(url).await
    }

    pub async fn fetch_text(&self, url: &str) -> FetchOutcome<String> {
        self.fetch(url).await
    }

    pub async fn fetch<T: ResponseBody>(&self, url: &str) -> FetchOutcome<T> {
        let attempts = self.max_retries + 1;
        let mut reason = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                self.pause().await;
            }

            self.requests.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("GET {} (attempt {}/{})", url, attempt, attempts);

            match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => {
                    return FetchOutcome::NotFound;
                }
                Ok(response) if response.status().is_success() => match T::read(response).await {
                    Ok(body) => return FetchOutcome::Fetched(body),
                    Err(e) => reason = format!("failed to read body: {}", e),
                },
                Ok(response) => reason = format!("HTTP {}", response.status()),
                Err(e) => reason = e.to_string(),
            }

            tracing::warn!(
                "⚠️ Request to {} failed (attempt {}/{}): {}",
                url,
                attempt,
                attempts,
                reason
            );
        }

        FetchOutcome::Abandoned { attempts, reason }
    }

    /// Single HEAD request; true on a success status.
    pub async fn is_reachable(&self, url: &str) -> bool {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!("⚠️ HEAD {} answered {}", url, response.status());
                false
            }
            Err(e) => {
                tracing::warn!("⚠️ HEAD {} failed: {}", url, e);
                false
            }
        }
    }
}

pub async fn pause_for(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| EtlError::InvalidConfigValueError {
        field: field.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use httpmock::Method::HEAD;

    fn fast_config(max_retries: u32) -> HttpConfig {
        HttpConfig {
            request_delay_ms: 0,
            max_retries,
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/lista")
                    .header_exists("user-agent")
                    .header("accept-language", "pt-BR,pt;q=0.9,en;q=0.8");
                then.status(200).body("<html>ok</html>");
            })
            .await;

        let fetcher = PageFetcher::new(&fast_config(0)).unwrap();
        let outcome = fetcher.fetch_text(&server.url("/lista")).await;

        mock.assert_async().await;
        assert_eq!(outcome, FetchOutcome::Fetched("<html>ok</html>".to_string()));
        assert_eq!(fetcher.requests_made(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_retried_then_abandoned() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/instavel");
                then.status(503);
            })
            .await;

        let fetcher = PageFetcher::new(&fast_config(2)).unwrap();
        let outcome = fetcher.fetch_text(&server.url("/instavel")).await;

        mock.assert_hits_async(3).await;
        match outcome {
            FetchOutcome::Abandoned { attempts, reason } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("503"));
            }
            other => panic!("expected abandoned fetch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/sumiu");
                then.status(404);
            })
            .await;

        let fetcher = PageFetcher::new(&fast_config(3)).unwrap();
        let outcome = fetcher.fetch_bytes(&server.url("/sumiu")).await;

        mock.assert_hits_async(1).await;
        assert_eq!(outcome, FetchOutcome::NotFound);
        assert!(outcome.into_result("x").is_err());
    }

    #[tokio::test]
    async fn test_text_is_decoded_with_declared_charset() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/latin1");
                then.status(200)
                    .header("content-type", "text/html; charset=iso-8859-1")
                    .body(b"<p>Jo\xe3o Pessoa</p>".to_vec());
            })
            .await;

        let fetcher = PageFetcher::new(&fast_config(0)).unwrap();
        let outcome = fetcher.fetch_text(&server.url("/latin1")).await;

        assert_eq!(outcome, FetchOutcome::Fetched("<p>João Pessoa</p>".to_string()));
    }

    #[tokio::test]
    async fn test_head_check_reports_reachability() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(HEAD).path("/arquivo.zip");
                then.status(200);
            })
            .await;

        let fetcher = PageFetcher::new(&fast_config(0)).unwrap();

        assert!(fetcher.is_reachable(&server.url("/arquivo.zip")).await);
        assert!(!fetcher.is_reachable(&server.url("/sumiu.zip")).await);
        assert_eq!(fetcher.requests_made(), 2);
    }

    #[test]
    fn test_invalid_header_is_a_config_error() {
        let config = HttpConfig {
            accept_language: "pt\nBR".to_string(),
            ..HttpConfig::default()
        };
        assert!(matches!(
            PageFetcher::new(&config),
            Err(EtlError::InvalidConfigValueError { .. })
        ));
    }
}
