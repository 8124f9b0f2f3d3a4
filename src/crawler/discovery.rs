//! Category discovery
//!
//! The navigation surface of a store (its catalog or home page) is scanned
//! for category links. The result replaces the store's taxonomy in one
//! transaction, so a run never works from a half-written category list.

use crate::crawler::fetcher::{PageSource, PageStatus};
use crate::crawler::retry::{fetch_with_retry, FetchTask, RetryPolicy};
use crate::crawler::throttle::DomainThrottle;
use crate::extract::{clean_text, StoreRules};
use crate::storage::{open_storage, CategoryRecord, CategoryStore};
use crate::url::{matching_exclusion, resolve_link};
use crate::Result;
use scraper::Html;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Categories found on one navigation page
#[derive(Debug, Clone, Default)]
pub struct CategoryScan {
    pub records: Vec<CategoryRecord>,
    /// Links dropped by the store's exclusion list
    pub excluded: usize,
    /// Links without a usable name or URL
    pub invalid: usize,
    /// Links repeating an already seen category name
    pub duplicates: usize,
}

impl CategoryScan {
    pub fn skipped(&self) -> usize {
        self.excluded + self.invalid + self.duplicates
    }
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    /// Categories stored for the store after the pass
    pub saved: u64,
    pub skipped: u64,
    /// Categories stored before the pass
    pub previously_known: u64,
    /// The previous taxonomy was kept because nothing was found
    pub kept_previous: bool,
}

/// Finds a store's categories and records them
pub struct CategoryDiscoverer {
    rules: Arc<StoreRules>,
}

impl CategoryDiscoverer {
    pub fn new(rules: Arc<StoreRules>) -> Self {
        Self { rules }
    }

    /// Scans `html`, fetched from `page_url`, for category links
    ///
    /// Names are whitespace-normalized visible text, falling back to the
    /// link's `title` or `aria-label`. The first link of a given name wins.
    pub fn scan(&self, html: &str, page_url: &Url, discovered_at: &str) -> CategoryScan {
        let doc = Html::parse_document(html);
        let mut scan = CategoryScan::default();
        let mut seen = HashSet::new();

        for selector in &self.rules.categories {
            for link in doc.select(selector) {
                let element = link.value();
                let mut name = clean_text(&link.text().collect::<String>());
                if name.is_empty() {
                    name = element
                        .attr("title")
                        .or_else(|| element.attr("aria-label"))
                        .map(clean_text)
                        .unwrap_or_default();
                }

                let url = element.attr("href").and_then(|h| resolve_link(h, page_url));
                let url = match url {
                    Some(url) if !name.is_empty() => url,
                    _ => {
                        scan.invalid += 1;
                        continue;
                    }
                };

                if let Some(rule) = matching_exclusion(url.as_str(), &self.rules.exclusions) {
                    tracing::debug!("Excluding category {} ({}): matches '{}'", name, url, rule);
                    scan.excluded += 1;
                    continue;
                }

                if !seen.insert(name.clone()) {
                    scan.duplicates += 1;
                    continue;
                }

                scan.records.push(CategoryRecord {
                    store: self.rules.store.clone(),
                    category: name,
                    subcategory: None,
                    category_url: url.to_string(),
                    discovered_at: discovered_at.to_string(),
                });
            }
        }

        scan
    }

    /// Fetches the discovery page and replaces the stored taxonomy
    ///
    /// When nothing is found and `keep_on_empty` is set, a previously stored
    /// taxonomy is left untouched. A failed or blocked discovery page counts
    /// as nothing found.
    pub async fn discover(
        &self,
        source: &dyn PageSource,
        throttle: &DomainThrottle,
        policy: &RetryPolicy,
        discovery_url: &str,
        database_path: &Path,
        keep_on_empty: bool,
    ) -> Result<DiscoveryReport> {
        let store = self.rules.store.as_str();
        let task = FetchTask::new(discovery_url, source.strategy());
        let outcome = fetch_with_retry(source, throttle, policy, task).await;
        let discovered_at = chrono::Utc::now().to_rfc3339();

        let scan = match outcome.result {
            Ok(page) if page.status == PageStatus::Blocked => {
                tracing::warn!("Discovery page of {} is blocked: {}", store, page.url);
                CategoryScan::default()
            }
            Ok(page) => {
                let page_url = Url::parse(&page.url)?;
                self.scan(&page.content, &page_url, &discovered_at)
            }
            Err(e) => {
                tracing::warn!("Discovery page of {} failed: {}", store, e);
                CategoryScan::default()
            }
        };

        let mut storage = open_storage(database_path)?;
        let previously_known = storage.count_categories(store)?;
        let mut report = DiscoveryReport {
            skipped: scan.skipped() as u64,
            previously_known,
            ..Default::default()
        };

        if scan.records.is_empty() && previously_known > 0 && keep_on_empty {
            tracing::warn!(
                "No categories found for {}, keeping {} known categories",
                store,
                previously_known
            );
            report.saved = previously_known;
            report.kept_previous = true;
        } else {
            report.saved = storage.replace_categories(store, &scan.records)?;
        }

        tracing::info!(
            "Discovered categories for {}: {} saved, {} skipped ({} excluded, {} invalid, {} duplicates)",
            store,
            report.saved,
            report.skipped,
            scan.excluded,
            scan.invalid,
            scan.duplicates
        );

        Ok(report)
    }
}
