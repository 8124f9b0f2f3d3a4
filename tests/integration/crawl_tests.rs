use crate::common::*;
use grocery_harvest::crawler::{Coordinator, CrawlOptions};
use grocery_harvest::pipeline::product_identity;
use grocery_harvest::storage::{ProductStore, RunStatus, RunStore};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAIRY: &str = "/c/dairy";

async fn mount_dairy_catalog(server: &MockServer) {
    mount_catalog(server, &[(DAIRY, "Dairy")]).await;
}

#[tokio::test]
async fn test_full_crawl_over_pages_with_overlap() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    mount_page(
        &server,
        DAIRY,
        2,
        html(listing_page(&[("butter", "Butter", "95.50"), ("cheese", "Cheese", "210")], 3)),
    )
    .await;
    mount_page(
        &server,
        DAIRY,
        3,
        html(listing_page(&[("cheese", "Cheese", "210"), ("yogurt", "Yogurt", "32")], 3)),
    )
    .await;
    mount_first_page(
        &server,
        DAIRY,
        html(listing_page(&[("milk", "Milk 2.5%", "40"), ("kefir", "Kefir", "45,90")], 3)),
    )
    .await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.categories_saved, 1);
    assert_eq!(summary.categories_crawled, 1);
    assert_eq!(summary.pages_fetched, 3);
    assert_eq!(summary.items_processed, 6);
    assert_eq!(summary.items_saved, 5);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.items_failed, 0);

    let storage = db.open();
    assert_eq!(storage.count_products(Some(STORE)).unwrap(), 5);

    let kefir_url = format!("{}/p/kefir", server.uri());
    let kefir = storage
        .get_product(&product_identity(STORE, &kefir_url))
        .unwrap()
        .unwrap();
    assert_eq!(kefir.name, "Kefir");
    assert_eq!(kefir.price, 45.90);
    assert_eq!(kefir.category.as_deref(), Some("Dairy"));

    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counters.items_saved, 5);
    assert_eq!(run.counters.duplicates, 1);
}

#[tokio::test]
async fn test_rerun_updates_products_in_place() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .respond_with(html(listing_page(&[("milk", "Milk", "40"), ("kefir", "Kefir", "45")], 1)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_first_page(
        &server,
        DAIRY,
        html(listing_page(&[("milk", "Milk", "38.50"), ("kefir", "Kefir", "45")], 1)),
    )
    .await;

    for _ in 0..2 {
        let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
        let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();
        assert_eq!(summary.items_saved, 2);
    }

    let storage = db.open();
    assert_eq!(storage.count_products(Some(STORE)).unwrap(), 2);
    let milk_url = format!("{}/p/milk", server.uri());
    let milk = storage
        .get_product(&product_identity(STORE, &milk_url))
        .unwrap()
        .unwrap();
    assert_eq!(milk.price, 38.5);
}

#[tokio::test]
async fn test_not_found_ends_pagination() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    mount_page(&server, DAIRY, 2, ResponseTemplate::new(404)).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .and(query_param("page", "3"))
        .respond_with(html(listing_page(&[("yogurt", "Yogurt", "32")], 3)))
        .expect(0)
        .mount(&server)
        .await;
    mount_first_page(&server, DAIRY, html(listing_page(&[("milk", "Milk", "40")], 3))).await;

    let mut cfg = config(&server.uri(), &db.path);
    cfg.crawler.workers = 1;
    let mut coordinator = Coordinator::new(cfg, "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.pages_fetched, 1);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.items_saved, 1);
    assert_eq!(summary.categories_crawled, 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_page(&server, DAIRY, 2, html(listing_page(&[("butter", "Butter", "95")], 2))).await;
    mount_first_page(&server, DAIRY, html(listing_page(&[("milk", "Milk", "40")], 2))).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.retries, 1);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.items_saved, 2);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_page_only() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    mount_page(&server, DAIRY, 3, html(listing_page(&[("yogurt", "Yogurt", "32")], 3))).await;
    mount_first_page(&server, DAIRY, html(listing_page(&[("milk", "Milk", "40")], 3))).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.retries, 2);
    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.items_saved, 2);
    assert_eq!(summary.categories_crawled, 1);
}

#[tokio::test]
async fn test_empty_category_is_not_paginated() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .and(query_param("page", "2"))
        .respond_with(html(listing_page(&[("butter", "Butter", "95")], 2)))
        .expect(0)
        .mount(&server)
        .await;
    mount_first_page(
        &server,
        DAIRY,
        html(
            r#"<html><body><p>No products found</p><div class="pagination"><a href="?page=2">2</a></div></body></html>"#
                .to_string(),
        ),
    )
    .await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.categories_empty, 1);
    assert_eq!(summary.categories_crawled, 0);
    assert_eq!(summary.items_processed, 0);
}

#[tokio::test]
async fn test_invalid_cards_are_counted_not_saved() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    mount_first_page(
        &server,
        DAIRY,
        html(listing_page(&[("milk", "Milk", "40"), ("gift", "Gift card", "0")], 1)),
    )
    .await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.items_saved, 1);
    assert_eq!(db.open().count_products(Some(STORE)).unwrap(), 1);
    assert!(summary.items_invalid + summary.extraction_misses >= 1);
}

#[tokio::test]
async fn test_category_filter_and_cap() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(
        &server,
        &[("/c/dairy", "Dairy"), ("/c/bakery", "Bakery"), ("/c/drinks", "Drinks")],
    )
    .await;
    mount_first_page(&server, "/c/dairy", html(listing_page(&[("milk", "Milk", "40")], 1))).await;
    Mock::given(method("GET"))
        .and(path("/c/bakery"))
        .respond_with(html(listing_page(&[("bread", "Bread", "20")], 1)))
        .expect(0)
        .mount(&server)
        .await;
    mount_first_page(&server, "/c/drinks", html(listing_page(&[("water", "Water", "15")], 1))).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator
        .run(&CrawlOptions {
            category_filter: Some("dairy".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.categories_saved, 3);
    assert_eq!(summary.categories_crawled, 1);
    assert_eq!(summary.items_saved, 1);
}

#[tokio::test]
async fn test_two_transient_failures_then_success_saves_once() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_dairy_catalog(&server).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    mount_first_page(&server, DAIRY, html(listing_page(&[("milk", "Milk", "40")], 1))).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.retries, 2);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.items_saved, 1);
    assert_eq!(db.open().count_products(Some(STORE)).unwrap(), 1);
}

#[tokio::test]
async fn test_max_categories_caps_the_crawl() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(
        &server,
        &[("/c/dairy", "Dairy"), ("/c/bakery", "Bakery"), ("/c/drinks", "Drinks")],
    )
    .await;
    for (listing, slug) in [("/c/dairy", "milk"), ("/c/bakery", "bread"), ("/c/drinks", "water")] {
        mount_first_page(&server, listing, html(listing_page(&[(slug, slug, "20")], 1))).await;
    }

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator
        .run(&CrawlOptions {
            max_categories: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(summary.categories_saved, 3);
    assert_eq!(summary.categories_crawled, 2);
    assert_eq!(summary.items_saved, 2);
}

#[tokio::test]
async fn test_first_page_uses_canonical_category_url() {
    let server = MockServer::start().await;
    let db = TestDb::new();
    mount_catalog(&server, &[("/c/dairy?page=2", "Dairy")]).await;
    Mock::given(method("GET"))
        .and(path(DAIRY))
        .and(query_param("page", "2"))
        .respond_with(html(listing_page(&[("butter", "Butter", "95")], 2)))
        .expect(1)
        .mount(&server)
        .await;
    mount_first_page(&server, DAIRY, html(listing_page(&[("milk", "Milk", "40")], 2))).await;

    let mut coordinator = Coordinator::new(config(&server.uri(), &db.path), "hash");
    let summary = coordinator.run(&CrawlOptions::default()).await.unwrap();

    assert_eq!(summary.pages_fetched, 2);
    assert_eq!(summary.duplicates, 0);
    assert_eq!(summary.items_saved, 2);
}
