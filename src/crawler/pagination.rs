//! Page count resolution and page URL construction

use crate::extract::{clean_text, StoreRules};
use crate::url::resolve_link;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use url::Url;

/// Determines how many listing pages a category has from its first page
#[derive(Debug, Clone)]
pub struct PaginationResolver {
    rules: Arc<StoreRules>,
    max_pages: Option<u32>,
}

impl PaginationResolver {
    pub fn new(rules: Arc<StoreRules>, max_pages: Option<u32>) -> Self {
        Self { rules, max_pages }
    }

    /// Resolves the total page count of the listing whose first page is `html`
    ///
    /// In order of preference:
    /// 1. the page index carried by the "last page" control
    /// 2. the largest numeric label among the pagination entries
    /// 3. one page
    ///
    /// The result is at least 1 and never above the configured cap.
    pub fn resolve(&self, html: &str, page_url: &Url) -> u32 {
        let doc = Html::parse_document(html);
        let total = self
            .last_page_index(&doc, page_url)
            .or_else(|| self.max_item_label(&doc))
            .unwrap_or(1)
            .max(1);

        match self.max_pages {
            Some(cap) if total > cap => {
                tracing::debug!("Capping {} pages at {} for {}", total, cap, page_url);
                cap
            }
            _ => total,
        }
    }

    fn last_page_index(&self, doc: &Html, page_url: &Url) -> Option<u32> {
        let selector = self.rules.last_page.as_ref()?;
        let element = doc.select(selector).next()?;
        let href = element
            .value()
            .attr("href")
            .or_else(|| element.value().attr("data-href"));

        href.and_then(|h| resolve_link(h, page_url))
            .and_then(|u| page_index(&u, &self.rules.page_param))
            .or_else(|| numeric_label(element))
    }

    fn max_item_label(&self, doc: &Html) -> Option<u32> {
        self.rules
            .pagination_items
            .iter()
            .flat_map(|selector| doc.select(selector))
            .filter_map(numeric_label)
            .max()
    }
}

/// Reads the page index carried by `param` in the query of `url`
pub fn page_index(url: &Url, param: &str) -> Option<u32> {
    url.query_pairs()
        .find(|(key, _)| key == param)
        .and_then(|(_, value)| value.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

fn numeric_label(element: ElementRef) -> Option<u32> {
    let text = clean_text(&element.text().collect::<String>());
    text.parse::<u32>().ok().filter(|n| *n > 0)
}

/// Builds the URL of page `page` of the listing at `category_url`
///
/// Page 1 is the canonical URL with the page parameter removed. Other pages
/// carry the parameter, replacing any value already present.
///
/// # Examples
///
/// ```
/// use grocery_harvest::crawler::page_url;
///
/// let url = page_url("https://shop.example/c/milk?sort=asc&page=3", "page", 5).unwrap();
/// assert_eq!(url, "https://shop.example/c/milk?sort=asc&page=5");
/// let first = page_url("https://shop.example/c/milk?page=3", "page", 1).unwrap();
/// assert_eq!(first, "https://shop.example/c/milk");
/// ```
pub fn page_url(category_url: &str, param: &str, page: u32) -> Result<String, url::ParseError> {
    let mut url = Url::parse(category_url)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_query(None);
    if !kept.is_empty() || page > 1 {
        let mut query = url.query_pairs_mut();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        if page > 1 {
            query.append_pair(param, &page.to_string());
        }
    }
    Ok(url.to_string())
}

/// URLs of pages `2..=total`
pub fn follow_up_pages(
    category_url: &str,
    param: &str,
    total: u32,
) -> Result<Vec<(u32, String)>, url::ParseError> {
    (2..=total)
        .map(|n| page_url(category_url, param, n).map(|u| (n, u)))
        .collect()
}
