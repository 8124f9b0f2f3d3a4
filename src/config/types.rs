use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Grocery-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "store")]
    pub stores: Vec<StoreConfig>,
}

impl Config {
    /// Looks up a store by its id
    pub fn store(&self, id: &str) -> Option<&StoreConfig> {
        self.stores.iter().find(|s| s.id == id)
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Concurrent direct-HTTP workers per category
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Concurrent headless browser pages
    #[serde(rename = "max-browser-sessions", default = "default_browser_sessions")]
    pub max_browser_sessions: u32,

    /// Retries after the first attempt for transient failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Timeout for one direct HTTP request (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Timeout for one rendered navigation (milliseconds)
    #[serde(rename = "render-timeout-ms", default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Upper bound on the content-ready wait (milliseconds)
    #[serde(rename = "ready-timeout-ms", default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "domain-delay-ms", default = "default_domain_delay_ms")]
    pub domain_delay_ms: u64,

    /// Unit of the extra domain delay applied after 429/403 (milliseconds)
    #[serde(rename = "throttle-step-ms", default = "default_throttle_step_ms")]
    pub throttle_step_ms: u64,

    /// Pause between two categories of one store (milliseconds)
    #[serde(rename = "category-delay-ms", default = "default_category_delay_ms")]
    pub category_delay_ms: u64,

    /// Items accumulated before a persistence flush
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Optional cap on the resolved page count of a category
    #[serde(rename = "max-pages", default)]
    pub max_pages: Option<u32>,

    /// Keep the previous taxonomy when discovery finds nothing
    #[serde(
        rename = "keep-categories-on-empty",
        default = "default_keep_categories_on_empty"
    )]
    pub keep_categories_on_empty: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_browser_sessions: default_browser_sessions(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            render_timeout_ms: default_render_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
            domain_delay_ms: default_domain_delay_ms(),
            throttle_step_ms: default_throttle_step_ms(),
            category_delay_ms: default_category_delay_ms(),
            batch_size: default_batch_size(),
            max_pages: None,
            keep_categories_on_empty: default_keep_categories_on_empty(),
        }
    }
}

/// Header set sent by the direct strategy
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "accept-language", default = "default_accept_language")]
    pub accept_language: String,

    /// Additional fixed headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            headers: BTreeMap::new(),
        }
    }
}

/// Textual markers used to classify fetched content
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(
        rename = "challenge-fingerprints",
        default = "default_challenge_fingerprints"
    )]
    pub challenge_fingerprints: Vec<String>,

    #[serde(rename = "empty-fingerprints", default = "default_empty_fingerprints")]
    pub empty_fingerprints: Vec<String>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            challenge_fingerprints: default_challenge_fingerprints(),
            empty_fingerprints: default_empty_fingerprints(),
        }
    }
}

/// Headless browser configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Chrome/Chromium binary; autodetected when absent
    #[serde(rename = "chrome-executable", default)]
    pub chrome_executable: Option<String>,

    #[serde(
        rename = "blocked-resource-types",
        default = "default_blocked_resource_types"
    )]
    pub blocked_resource_types: Vec<String>,

    #[serde(rename = "blocked-url-patterns", default = "default_blocked_url_patterns")]
    pub blocked_url_patterns: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_executable: None,
            blocked_resource_types: default_blocked_resource_types(),
            blocked_url_patterns: default_blocked_url_patterns(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// One storefront
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Short stable id, written into every record
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Page used for category discovery; defaults to `base-url`
    #[serde(rename = "catalog-url", default)]
    pub catalog_url: Option<String>,

    /// Fetch through the headless browser instead of plain HTTP
    #[serde(rename = "rendering-required", default)]
    pub rendering_required: bool,

    /// Retry a blocked first page once with the rendered strategy
    #[serde(rename = "escalate-on-block", default = "default_true")]
    pub escalate_on_block: bool,

    /// Category URLs containing any of these are skipped
    #[serde(rename = "exclude-url-substrings", default)]
    pub exclude_url_substrings: Vec<String>,

    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub referer: Option<String>,

    pub selectors: SelectorConfig,
}

impl StoreConfig {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn discovery_url(&self) -> &str {
        self.catalog_url.as_deref().unwrap_or(&self.base_url)
    }
}

/// Per-store extraction rules (CSS selectors and regular expressions)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectorConfig {
    /// Category links on the navigation surface
    pub categories: Vec<String>,

    /// Product card candidates, tried in order
    #[serde(rename = "product-cards")]
    pub product_cards: Vec<String>,

    /// Title locations inside a card, tried in order
    #[serde(default)]
    pub titles: Vec<String>,

    /// Current price locations inside a card, tried in order
    #[serde(default)]
    pub prices: Vec<String>,

    /// Regular expressions applied to the card markup when no price selector matches
    #[serde(rename = "price-patterns", default)]
    pub price_patterns: Vec<String>,

    /// Pre-discount price locations
    #[serde(rename = "original-prices", default)]
    pub original_prices: Vec<String>,

    /// Product link inside a card; the card itself when absent
    #[serde(rename = "product-link", default)]
    pub product_link: Option<String>,

    #[serde(default = "default_image_selectors")]
    pub images: Vec<String>,

    /// "Jump to last page" control
    #[serde(rename = "last-page", default)]
    pub last_page: Option<String>,

    #[serde(rename = "pagination-items", default = "default_pagination_items")]
    pub pagination_items: Vec<String>,

    #[serde(default)]
    pub breadcrumbs: Option<String>,

    /// Content-ready predicate for rendered pages
    #[serde(default)]
    pub ready: Vec<String>,

    #[serde(rename = "empty-state", default)]
    pub empty_state: Option<String>,

    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Read products from an embedded JSON state blob when no card matches
    #[serde(rename = "embedded-state", default)]
    pub embedded_state: bool,
}

fn default_workers() -> u32 {
    5
}

fn default_browser_sessions() -> u32 {
    4
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_render_timeout_ms() -> u64 {
    60_000
}

fn default_ready_timeout_ms() -> u64 {
    5_000
}

fn default_domain_delay_ms() -> u64 {
    300
}

fn default_throttle_step_ms() -> u64 {
    1000
}

fn default_category_delay_ms() -> u64 {
    2000
}

fn default_batch_size() -> usize {
    100
}

fn default_keep_categories_on_empty() -> bool {
    true
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string()
}

fn default_accept_language() -> String {
    "uk-UA,uk;q=0.9,en-US;q=0.8,en;q=0.7,ru;q=0.6".to_string()
}

fn default_challenge_fingerprints() -> Vec<String> {
    [
        "just a moment",
        "enable javascript and cookies",
        "_cf_chl_opt",
        "challenge-platform/h/g",
        "cf-browser-verification",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_empty_fingerprints() -> Vec<String> {
    [
        "no products found",
        "немає товарів",
        "empty-results",
        "no-results",
        "page not found",
        "сторінка не знайдена",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_blocked_resource_types() -> Vec<String> {
    [
        "image",
        "media",
        "font",
        "stylesheet",
        "ping",
        "prefetch",
        "other",
        "websocket",
        "manifest",
        "texttrack",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_blocked_url_patterns() -> Vec<String> {
    [
        "google-analytics",
        "googletagmanager",
        "doubleclick",
        "facebook",
        "yandex",
        "clarity.ms",
        "hotjar",
        "segment",
        "sentry.io",
        "newrelic",
        "datadog",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_image_selectors() -> Vec<String> {
    vec!["img".to_string()]
}

fn default_pagination_items() -> Vec<String> {
    [".pagination a", ".pagination li", ".pagination-item", ".Pagination__item"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_page_param() -> String {
    "page".to_string()
}
