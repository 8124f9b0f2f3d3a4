use crate::common::*;
use async_trait::async_trait;
use grocery_harvest::crawler::{
    AdapterSource, ContentClassifier, Coordinator, CrawlOptions, ExternalFetch, FetchError,
    PageResult, PageSource, PageStatus, Strategy,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHALLENGE: &str =
    "<html><head><title>Just a moment...</title></head><body>Checking your browser</body></html>";

/// A rendered source serving canned markup by URL
struct ScriptedBrowser {
    pages: HashMap<String, String>,
    calls: AtomicU32,
}

impl ScriptedBrowser {
    fn new(pages: Vec<(String, String)>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PageSource for ScriptedBrowser {
    fn strategy(&self) -> Strategy {
        Strategy::Rendered
    }

    async fn fetch(&self, url: &str) -> Result<PageResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(url) {
            Some(content) => Ok(PageResult {
                url: url.to_string(),
                status: PageStatus::Ok,
                http_status: None,
                content: content.clone(),
                challenge_detected: false,
                no_results_detected: false,
            }),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
        }
    }
}

/// A third-party fetching service backed by a map
struct MapFetch(HashMap<String, String>);

#[async_trait]
impl ExternalFetch for MapFetch {
    async fn fetch(&self, url: &str) -> Option<String> {
        self.0.get(url).cloned()
    }
}

#[tokio::test]
async fn test_challenge_page_blocks_category_without_retry() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(&server, &[("/c/dairy", "Dairy")]).await;
    Mock::given(method("GET"))
        .and(path("/c/dairy"))
        .respond_with(ResponseTemplate::new(403).set_body_string(CHALLENGE))
        .expect(1)
        .mount(&server)
        .await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.pages_blocked, 1);
    assert_eq!(summary.categories_blocked, 1);
    assert_eq!(summary.categories_crawled, 0);
    assert_eq!(summary.retries, 0);
    assert_eq!(summary.stores_aborted, 0);
}

#[tokio::test]
async fn test_blocked_first_page_escalates_to_rendered() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(&server, &[("/c/dairy", "Dairy")]).await;
    mount_first_page(
        &server,
        "/c/dairy",
        ResponseTemplate::new(403).set_body_string(CHALLENGE),
    )
    .await;

    let category_url = format!("{}/c/dairy", server.uri());
    let browser = Arc::new(ScriptedBrowser::new(vec![(
        category_url,
        listing_page(&[("milk", "Milk", "40"), ("kefir", "Kefir", "45")], 1),
    )]));

    let mut cfg = config(&server.uri(), &db.path);
    cfg.stores[0].escalate_on_block = true;
    let mut coordinator =
        Coordinator::new(cfg, "hash").with_source(STORE, Strategy::Rendered, browser.clone());
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(browser.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.pages_blocked, 1);
    assert_eq!(summary.categories_blocked, 0);
    assert_eq!(summary.categories_crawled, 1);
    assert_eq!(summary.items_saved, 2);
}

#[tokio::test]
async fn test_rendering_required_store_uses_browser_for_every_page() {
    let db = TestDb::new();
    let base = "https://render.example";
    let browser = Arc::new(ScriptedBrowser::new(vec![
        (
            format!("{}/catalog", base),
            catalog_page(&[("/c/dairy", "Dairy")]),
        ),
        (
            format!("{}/c/dairy", base),
            listing_page(&[("milk", "Milk", "40")], 3),
        ),
        (
            format!("{}/c/dairy?page=2", base),
            listing_page(&[("kefir", "Kefir", "45")], 3),
        ),
        (
            format!("{}/c/dairy?page=3", base),
            listing_page(&[("butter", "Butter", "95")], 3),
        ),
    ]));

    let mut cfg = config(base, &db.path);
    cfg.stores[0].rendering_required = true;
    let mut coordinator =
        Coordinator::new(cfg, "hash").with_source(STORE, Strategy::Rendered, browser.clone());
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(browser.calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.items_saved, 3);
}

#[tokio::test]
async fn test_adapter_source_is_not_retried() {
    let db = TestDb::new();
    let base = "https://adapter.example";
    let mut cfg = config(base, &db.path);
    let classifier = ContentClassifier::new(&cfg.detection);
    cfg.crawler.workers = 1;

    let pages: HashMap<String, String> = [
        (
            format!("{}/catalog", base),
            catalog_page(&[("/c/dairy", "Dairy")]),
        ),
        (
            format!("{}/c/dairy", base),
            listing_page(&[("milk", "Milk", "40")], 3),
        ),
        (
            format!("{}/c/dairy?page=3", base),
            listing_page(&[("butter", "Butter", "95")], 3),
        ),
    ]
    .into_iter()
    .collect();
    let adapter = AdapterSource::new(MapFetch(pages), classifier);

    let mut coordinator =
        Coordinator::new(cfg, "hash").with_source(STORE, Strategy::Adapter, Arc::new(adapter));
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.categories_saved, 1);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.retries, 0);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.items_saved, 2);
}
