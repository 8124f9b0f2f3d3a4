//! Compiled per-store extraction rules
//!
//! Selector tables arrive as strings in the configuration; they are parsed
//! once per store so that every page of a run shares the same compiled set.

use crate::config::StoreConfig;
use crate::{ConfigError, ConfigResult};
use regex::Regex;
use scraper::Selector;

const HEADING_SELECTOR: &str = "h1, h2, h3, h4, h5, h6";
const ANCHOR_SELECTOR: &str = "a[href]";
const SCRIPT_SELECTOR: &str = "script";

/// Extraction and navigation rules for one store
#[derive(Debug, Clone)]
pub struct StoreRules {
    pub store: String,
    pub categories: Vec<Selector>,
    pub product_cards: Vec<Selector>,
    pub titles: Vec<Selector>,
    pub prices: Vec<Selector>,
    pub price_patterns: Vec<Regex>,
    pub original_prices: Vec<Selector>,
    pub product_link: Option<Selector>,
    pub images: Vec<Selector>,
    pub last_page: Option<Selector>,
    pub pagination_items: Vec<Selector>,
    pub breadcrumbs: Option<Selector>,
    pub headings: Selector,
    pub anchors: Selector,
    pub scripts: Selector,
    /// Raw CSS for the browser-side content-ready predicate
    pub ready: Vec<String>,
    pub empty_state: Option<String>,
    pub page_param: String,
    pub exclusions: Vec<String>,
    pub embedded_state: bool,
}

impl StoreRules {
    /// Compiles the selector table of `store`
    pub fn compile(store: &StoreConfig) -> ConfigResult<Self> {
        let s = &store.selectors;
        Ok(Self {
            store: store.id.clone(),
            categories: compile_all(&s.categories)?,
            product_cards: compile_all(&s.product_cards)?,
            titles: compile_all(&s.titles)?,
            prices: compile_all(&s.prices)?,
            price_patterns: s
                .price_patterns
                .iter()
                .map(|p| {
                    Regex::new(p)
                        .map_err(|e| ConfigError::InvalidPattern(format!("'{}': {}", p, e)))
                })
                .collect::<ConfigResult<Vec<_>>>()?,
            original_prices: compile_all(&s.original_prices)?,
            product_link: compile_opt(s.product_link.as_deref())?,
            images: compile_all(&s.images)?,
            last_page: compile_opt(s.last_page.as_deref())?,
            pagination_items: compile_all(&s.pagination_items)?,
            breadcrumbs: compile_opt(s.breadcrumbs.as_deref())?,
            headings: compile(HEADING_SELECTOR)?,
            anchors: compile(ANCHOR_SELECTOR)?,
            scripts: compile(SCRIPT_SELECTOR)?,
            ready: ready_predicate_selectors(store),
            empty_state: s.empty_state.clone(),
            page_param: s.page_param.clone(),
            exclusions: store.exclude_url_substrings.clone(),
            embedded_state: s.embedded_state,
        })
    }
}

/// Selectors whose presence marks a rendered page as ready
///
/// Product tiles or category links count as content even when the store
/// declares no explicit `ready` list.
fn ready_predicate_selectors(store: &StoreConfig) -> Vec<String> {
    let s = &store.selectors;
    let mut ready = s.ready.clone();
    if ready.is_empty() {
        ready.extend(s.product_cards.iter().cloned());
        ready.extend(s.categories.iter().cloned());
    }
    ready
}

pub(crate) fn compile(selector: &str) -> ConfigResult<Selector> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

fn compile_all(selectors: &[String]) -> ConfigResult<Vec<Selector>> {
    selectors.iter().map(|s| compile(s)).collect()
}

fn compile_opt(selector: Option<&str>) -> ConfigResult<Option<Selector>> {
    selector.map(compile).transpose()
}
