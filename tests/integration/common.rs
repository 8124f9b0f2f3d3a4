//! Shared fixtures: configuration text and storefront markup

use grocery_harvest::config::{parse_config, Config};
use grocery_harvest::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STORE: &str = "mock";

/// A temporary database location that lives as long as the value
pub struct TestDb {
    _dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.db");
        Self { _dir: dir, path }
    }

    pub fn open(&self) -> SqliteStorage {
        SqliteStorage::new(&self.path).unwrap()
    }
}

/// Configuration for one mock store served by `base`
pub fn config(base: &str, db: &Path) -> Config {
    let text = format!(
        r#"
[crawler]
workers = 3
max-retries = 2
backoff-base-ms = 5
domain-delay-ms = 0
throttle-step-ms = 1
category-delay-ms = 0
request-timeout-ms = 5000

[output]
database-path = '{db}'

[[store]]
id = "{store}"
name = "Mock Market"
base-url = "{base}"
catalog-url = "{base}/catalog"
escalate-on-block = false
exclude-url-substrings = ["/promo"]

[store.selectors]
categories = ["nav.menu a"]
product-cards = [".product-card"]
titles = [".product-title"]
prices = [".product-price"]
"#,
        db = db.display(),
        store = STORE,
        base = base
    );
    parse_config(&text).unwrap()
}

pub fn catalog_page(links: &[(&str, &str)]) -> String {
    let anchors: String = links
        .iter()
        .map(|(href, name)| format!(r#"<a href="{}">{}</a>"#, href, name))
        .collect();
    format!(
        r#"<html><body><nav class="menu">{}</nav><footer><a href="/about">About</a></footer></body></html>"#,
        anchors
    )
}

/// A listing page with `(slug, name, price)` products and `pages` pagination links
pub fn listing_page(products: &[(&str, &str, &str)], pages: u32) -> String {
    let cards: String = products
        .iter()
        .map(|(slug, name, price)| {
            format!(
                r#"<div class="product-card"><a href="/p/{}"><span class="product-title">{}</span></a><span class="product-price">{} грн</span></div>"#,
                slug, name, price
            )
        })
        .collect();
    let pagination: String = if pages > 1 {
        let links: String = (1..=pages)
            .map(|n| format!(r#"<a href="?page={n}">{n}</a>"#, n = n))
            .collect();
        format!(r#"<div class="pagination">{}</div>"#, links)
    } else {
        String::new()
    };
    format!(
        r#"<html><body><main>{}</main>{}</body></html>"#,
        cards, pagination
    )
}

pub fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body)
}

pub async fn mount_catalog(server: &MockServer, links: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path("/catalog"))
        .respond_with(html(catalog_page(links)))
        .mount(server)
        .await;
}

/// Mounts page `page` (>= 2) of a listing; must precede the page 1 mock
pub async fn mount_page(server: &MockServer, listing: &str, page: u32, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(listing))
        .and(query_param("page", page.to_string()))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Mounts the canonical first page of a listing
pub async fn mount_first_page(server: &MockServer, listing: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(listing))
        .respond_with(response)
        .mount(server)
        .await;
}
