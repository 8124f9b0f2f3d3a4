//! Page fetching over plain HTTP
//!
//! This module holds the pieces shared by every fetch strategy:
//! - The `PageResult` record and its status classification
//! - The `FetchError` taxonomy used by the retry layer
//! - The `PageSource` seam implemented by each strategy
//! - The direct strategy itself, built on a browser-like reqwest client

use crate::config::{DetectionConfig, HttpConfig, StoreConfig};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Classification of one fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageStatus {
    /// Content retrieved
    Ok,
    /// An anti-bot interstitial was served instead of the page
    Blocked,
    /// The page reports that the listing has no products
    Empty,
    /// The response was unusable
    Error,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Ok => "ok",
            PageStatus::Blocked => "blocked",
            PageStatus::Empty => "empty",
            PageStatus::Error => "error",
        }
    }
}

/// Outcome of fetching one URL
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: String,
    pub status: PageStatus,
    /// HTTP status when the strategy observes one
    pub http_status: Option<u16>,
    pub content: String,
    pub challenge_detected: bool,
    pub no_results_detected: bool,
}

impl PageResult {
    pub fn is_blocked(&self) -> bool {
        self.status == PageStatus::Blocked
    }
}

/// Fetch mechanism used for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Plain HTTP GET with browser-like headers
    Direct,
    /// Headless browser navigation
    Rendered,
    /// Externally supplied fetcher with its own retry policy
    Adapter,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Rendered => "rendered",
            Strategy::Adapter => "adapter",
        }
    }
}

/// Failure of a single fetch attempt or of a whole retry sequence
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Worth retrying: network failure, timeout, 403/408/429/5xx, blank body
    #[error("transient failure for {url}: {reason}")]
    Transient {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The page does not exist
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Permanent HTTP failure
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    /// Retry budget spent
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// HTTP status attached to the failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Transient { status, .. } => *status,
            FetchError::NotFound { .. } => Some(404),
            FetchError::Http { status, .. } => Some(*status),
            FetchError::Exhausted { .. } => None,
        }
    }

    pub(crate) fn transient(url: &str, status: Option<u16>, reason: impl Into<String>) -> Self {
        FetchError::Transient {
            url: url.to_string(),
            status,
            reason: reason.into(),
        }
    }
}

/// A way of turning a URL into page content
///
/// Implementations make exactly one attempt per call; retries, backoff and
/// domain pacing live in the retry layer.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn fetch(&self, url: &str) -> Result<PageResult, FetchError>;

    /// True when the source retries internally and must not be retried again
    fn handles_retries(&self) -> bool {
        false
    }
}

/// Classifies page content with lowercase substring fingerprints
#[derive(Debug, Clone)]
pub struct ContentClassifier {
    challenge: Vec<String>,
    empty: Vec<String>,
}

impl ContentClassifier {
    pub fn new(config: &DetectionConfig) -> Self {
        let lower = |items: &[String]| {
            items
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            challenge: lower(&config.challenge_fingerprints),
            empty: lower(&config.empty_fingerprints),
        }
    }

    /// Builds the `PageResult` of a successfully retrieved body
    ///
    /// A challenge marker always wins over an empty-state marker.
    pub fn classify(&self, url: &str, http_status: Option<u16>, content: String) -> PageResult {
        let haystack = content.to_lowercase();
        let challenge_detected = self.challenge.iter().any(|m| haystack.contains(m.as_str()));
        let no_results_detected =
            !challenge_detected && self.empty.iter().any(|m| haystack.contains(m.as_str()));

        let status = if challenge_detected {
            PageStatus::Blocked
        } else if no_results_detected {
            PageStatus::Empty
        } else {
            PageStatus::Ok
        };

        PageResult {
            url: url.to_string(),
            status,
            http_status,
            content,
            challenge_detected,
            no_results_detected,
        }
    }

    pub fn is_challenge(&self, content: &str) -> bool {
        let haystack = content.to_lowercase();
        self.challenge.iter().any(|m| haystack.contains(m.as_str()))
    }
}

/// True for statuses that deserve another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 403 | 408 | 429) || status.is_server_error()
}

/// Builds the HTTP client used by the direct strategy of one store
///
/// The header set mimics a desktop browser: accept types, language
/// preferences, no-cache hints, plus the store's origin and referer.
///
/// # Arguments
///
/// * `http` - Shared header configuration
/// * `store` - The store whose origin and referer are attached
/// * `timeout` - Per-request timeout
pub fn build_http_client(
    http: &HttpConfig,
    store: &StoreConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(reqwest::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(reqwest::header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(reqwest::header::DNT, HeaderValue::from_static("1"));
    headers.insert(
        reqwest::header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );

    let origin = store.origin.as_deref().unwrap_or(&store.base_url);
    let referer = store.referer.as_deref().unwrap_or(&store.base_url);
    let mut extra: Vec<(&str, &str)> = vec![
        ("accept-language", http.accept_language.as_str()),
        ("origin", origin),
        ("referer", referer),
    ];
    extra.extend(http.headers.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Skipping invalid header {}: {}", name, value),
        }
    }

    Client::builder()
        .user_agent(http.user_agent.clone())
        .default_headers(headers)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP strategy
pub struct DirectFetcher {
    client: Client,
    classifier: ContentClassifier,
}

impl DirectFetcher {
    pub fn new(client: Client, classifier: ContentClassifier) -> Self {
        Self { client, classifier }
    }
}

#[async_trait]
impl PageSource for DirectFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Direct
    }

    async fn fetch(&self, url: &str) -> Result<PageResult, FetchError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    "connection failed".to_string()
                } else {
                    e.to_string()
                };
                return Err(FetchError::transient(url, None, reason));
            }
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::transient(url, Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            // An interstitial served with 403/503 is a block, not a flaky response
            if self.classifier.is_challenge(&body) {
                return Ok(self.classifier.classify(url, Some(status.as_u16()), body));
            }
            if is_retryable_status(status) {
                return Err(FetchError::transient(
                    url,
                    Some(status.as_u16()),
                    format!("HTTP {}", status.as_u16()),
                ));
            }
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if body.trim().is_empty() {
            return Err(FetchError::transient(url, Some(status.as_u16()), "empty body"));
        }

        Ok(self.classifier.classify(url, Some(status.as_u16()), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;

    fn classifier() -> ContentClassifier {
        ContentClassifier::new(&DetectionConfig::default())
    }

    fn store() -> StoreConfig {
        StoreConfig {
            id: "shop".to_string(),
            name: None,
            base_url: "https://shop.example".to_string(),
            catalog_url: None,
            rendering_required: false,
            escalate_on_block: true,
            exclude_url_substrings: vec![],
            origin: None,
            referer: Some("https://shop.example/catalog".to_string()),
            selectors: SelectorConfig::default(),
        }
    }

    #[test]
    fn test_classify_ok() {
        let page = classifier().classify("https://a/", Some(200), "<div class=card></div>".into());
        assert_eq!(page.status, PageStatus::Ok);
        assert!(!page.challenge_detected);
        assert!(!page.no_results_detected);
    }

    #[test]
    fn test_classify_challenge_case_insensitive() {
        let page = classifier().classify("https://a/", Some(403), "<title>Just a Moment...</title>".into());
        assert_eq!(page.status, PageStatus::Blocked);
        assert!(page.is_blocked());
    }

    #[test]
    fn test_cloudflare_insights_script_is_not_a_challenge() {
        let html = r#"<article class="catalog-item">Milk</article>
<script>(function(){var a=document.createElement('script');
a.src='/cdn-cgi/challenge-platform/h/b/scripts/jsd/abc/main.js';})();</script>"#;
        let page = classifier().classify("https://a/", Some(200), html.into());
        assert_eq!(page.status, PageStatus::Ok);
        assert!(!page.challenge_detected);
    }

    #[test]
    fn test_managed_challenge_script_is_blocked() {
        let html = "<script src=\"/cdn-cgi/challenge-platform/h/g/orchestrate/chl_page/v1\"></script>";
        let page = classifier().classify("https://a/", Some(403), html.into());
        assert_eq!(page.status, PageStatus::Blocked);
    }

    #[test]
    fn test_classify_empty() {
        let page = classifier().classify("https://a/", Some(200), "<p>Немає товарів</p>".into());
        assert_eq!(page.status, PageStatus::Empty);
        assert!(page.no_results_detected);
    }

    #[test]
    fn test_challenge_beats_empty() {
        let page = classifier().classify(
            "https://a/",
            Some(200),
            "window._cf_chl_opt = {}; no products found".into(),
        );
        assert_eq!(page.status, PageStatus::Blocked);
        assert!(!page.no_results_detected);
    }

    #[test]
    fn test_retryable_statuses() {
        for code in [403u16, 408, 429, 500, 502, 503, 522, 524] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()), "{}", code);
        }
        for code in [400u16, 401, 404, 410] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()), "{}", code);
        }
    }

    #[test]
    fn test_fetch_error_status() {
        assert_eq!(FetchError::transient("u", Some(429), "x").status(), Some(429));
        assert_eq!(FetchError::NotFound { url: "u".into() }.status(), Some(404));
        assert!(FetchError::transient("u", None, "x").is_transient());
        assert!(!FetchError::NotFound { url: "u".into() }.is_transient());
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&HttpConfig::default(), &store(), Duration::from_secs(5));
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_skips_invalid_header() {
        let mut http = HttpConfig::default();
        http.headers.insert("bad header".to_string(), "x".to_string());
        let client = build_http_client(&http, &store(), Duration::from_secs(5));
        assert!(client.is_ok());
    }
}
