use crate::common::*;
use grocery_harvest::crawler::{Coordinator, CrawlOptions};
use grocery_harvest::storage::{CategoryStore, RunStatus, RunStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

fn discover_only() -> CrawlOptions {
    CrawlOptions {
        discover_only: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_discovery_applies_exclusions() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(
        &server,
        &[
            ("/c/dairy", "Молочні продукти"),
            ("/c/bakery", "Хліб"),
            ("/promo/week", "Акції тижня"),
        ],
    )
    .await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&discover_only()).await.unwrap();

    assert_eq!(summary.categories_saved, 2);
    assert_eq!(summary.categories_skipped, 1);
    assert_eq!(summary.items_processed, 0);

    let categories = db.open().list_categories(STORE).unwrap();
    let names: Vec<&str> = categories.iter().map(|c| c.category.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Молочні продукти"));
    assert!(names.contains(&"Хліб"));
    assert!(categories
        .iter()
        .all(|c| c.category_url.starts_with(&server.uri()) && c.subcategory.is_none()));
}

#[tokio::test]
async fn test_store_without_categories_is_aborted() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(&server, &[]).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.stores_aborted, 1);
    let storage = db.open();
    assert_eq!(storage.count_categories(STORE).unwrap(), 0);
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.config_hash, "hash");
}

#[tokio::test]
async fn test_empty_rediscovery_keeps_known_categories() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(catalog_page(&[("/c/dairy", "Dairy"), ("/c/bakery", "Bakery")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_catalog(&server, &[]).await;

    let mut first = Coordinator::new(config(&server.uri(), &db.path), "hash");
    first.run(&discover_only()).await.unwrap();

    let mut second = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = second
        .run(&CrawlOptions {
            discover_only: true,
            rediscover: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.stores_aborted, 0);
    assert_eq!(summary.categories_saved, 0);
    assert_eq!(db.open().count_categories(STORE).unwrap(), 2);
}

#[tokio::test]
async fn test_empty_rediscovery_clears_when_not_kept() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(catalog_page(&[("/c/dairy", "Dairy")])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_catalog(&server, &[]).await;

    let mut first = Coordinator::new(config(&server.uri(), &db.path), "hash");
    first.run(&discover_only()).await.unwrap();

    let mut cfg = config(&server.uri(), &db.path);
    cfg.crawler.keep_categories_on_empty = false;
    let mut second = Coordinator::new(cfg, "hash");
    let summary = second
        .run(&CrawlOptions {
            discover_only: true,
            rediscover: true,
            ..Default::default()
        })
        .await
        .unwrap();

    // Categories were known before, so the store is not aborted
    assert_eq!(summary.stores_aborted, 0);
    assert_eq!(db.open().count_categories(STORE).unwrap(), 0);
}

#[tokio::test]
async fn test_known_categories_skip_discovery() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(catalog_page(&[("/c/dairy", "Dairy")])))
        .expect(1)
        .mount(&server)
        .await;
    mount_first_page(&server, "/c/dairy", html(listing_page(&[("milk", "Milk", "40")], 1))).await;

    for _ in 0..2 {
        let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
        let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();
        assert_eq!(summary.categories_crawled, 1);
    }
}

#[tokio::test]
async fn test_unknown_store_is_rejected() {
    let server = MockServer::start().await;
    let db = TestDb::new();

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let result = coordinator
        .run(&CrawlOptions {
            stores: vec!["nope".to_string()],
            ..Default::default()
        })
        .await;
    assert!(matches!(
        result,
        Err(grocery_harvest::HarvestError::UnknownStore(id)) if id == "nope"
    ));
}
