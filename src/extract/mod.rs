//! Product extraction
//!
//! One algorithm serves every storefront; only the compiled [`StoreRules`]
//! differ. For each page:
//!
//! 1. the first card selector yielding at least one element wins
//! 2. the name comes from the first non-empty of: title selectors, image alt
//!    text, a generic heading, the card's `title`/`aria-label`
//! 3. the price comes from the price selectors, then the store's regex
//!    patterns over the card markup
//! 4. product and image URLs are resolved against the page URL
//! 5. breadcrumbs on the page override the category the page was fetched under
//!
//! Cards without a name or a positive price are counted as misses and never
//! yielded.

mod embedded;
pub mod price;
mod rules;

pub use rules::StoreRules;

use crate::url::resolve_link;
use price::{price_from_element, price_from_pattern};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use url::Url;

/// Image alt texts that label a currency glyph rather than the product
const CURRENCY_ALT_TEXTS: &[&str] = &["гривня", "грн", "₴", "uah"];

/// Category a page was fetched under
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryContext {
    pub category: Option<String>,
    pub subcategory: Option<String>,
}

impl CategoryContext {
    pub fn new(category: impl Into<String>, subcategory: Option<String>) -> Self {
        Self {
            category: Some(category.into()),
            subcategory,
        }
    }
}

/// A product as read off the page, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct ProductCandidate {
    pub store: String,
    pub name: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
}

/// Result of extracting one page
#[derive(Debug, Default)]
pub struct Extraction {
    pub candidates: Vec<ProductCandidate>,
    /// Cards located on the page
    pub cards_found: usize,
    /// Cards dropped for lack of a name or price
    pub misses: usize,
    pub from_embedded_state: bool,
}

/// Fields of one card before URL resolution
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProductParts {
    pub name: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub href: Option<String>,
    pub image_src: Option<String>,
}

/// Turns fetched pages into candidate product records for one store
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    rules: Arc<StoreRules>,
}

impl ProductExtractor {
    pub fn new(rules: Arc<StoreRules>) -> Self {
        Self { rules }
    }

    /// Extracts candidates from `html`, fetched from `page_url` under `context`
    pub fn extract(&self, html: &str, page_url: &Url, context: &CategoryContext) -> Extraction {
        let rules = &*self.rules;
        let doc = Html::parse_document(html);
        let mut extraction = Extraction::default();

        let (category, subcategory) = match breadcrumb_category(&doc, rules, page_url) {
            Some((category, subcategory)) => (Some(category), subcategory),
            None => (context.category.clone(), context.subcategory.clone()),
        };

        let cards = locate_cards(&doc, &rules.product_cards);
        extraction.cards_found = cards.len();

        let mut parts = Vec::with_capacity(cards.len());
        for card in cards {
            match parts_from_card(card, rules) {
                Some(p) => parts.push(p),
                None => extraction.misses += 1,
            }
        }

        if extraction.cards_found == 0 && rules.embedded_state {
            parts = embedded::embedded_products(&doc, rules);
            extraction.from_embedded_state = !parts.is_empty();
        }

        extraction.candidates = parts
            .into_iter()
            .map(|p| ProductCandidate {
                store: rules.store.clone(),
                name: p.name,
                price: p.price,
                original_price: p.original_price,
                category: category.clone(),
                subcategory: subcategory.clone(),
                url: p
                    .href
                    .and_then(|h| resolve_link(&h, page_url))
                    .map(|u| u.to_string()),
                image_url: p
                    .image_src
                    .and_then(|h| resolve_link(&h, page_url))
                    .map(|u| u.to_string()),
            })
            .collect();

        tracing::trace!(
            "Extracted {} candidates from {} cards at {} ({} misses)",
            extraction.candidates.len(),
            extraction.cards_found,
            page_url,
            extraction.misses
        );

        extraction
    }
}

/// Collapses runs of whitespace into single spaces and trims
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef) -> String {
    clean_text(&element.text().collect::<String>())
}

fn locate_cards<'a>(doc: &'a Html, selectors: &[Selector]) -> Vec<ElementRef<'a>> {
    for selector in selectors {
        let cards: Vec<_> = doc.select(selector).collect();
        if !cards.is_empty() {
            return cards;
        }
    }
    Vec::new()
}

fn parts_from_card(card: ElementRef, rules: &StoreRules) -> Option<ProductParts> {
    let name = resolve_name(card, rules)?;
    let price = resolve_price(card, &rules.prices, &rules.price_patterns)?;
    let original_price = resolve_price(card, &rules.original_prices, &[])
        .filter(|original| *original > price);

    Some(ProductParts {
        name,
        price,
        original_price,
        href: resolve_href(card, rules),
        image_src: resolve_image(card, &rules.images),
    })
}

fn resolve_name(card: ElementRef, rules: &StoreRules) -> Option<String> {
    for selector in &rules.titles {
        for element in card.select(selector) {
            let text = element_text(element);
            if !text.is_empty() {
                return Some(text);
            }
            if let Some(title) = element.value().attr("title").map(clean_text) {
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    for selector in &rules.images {
        for image in card.select(selector) {
            if let Some(alt) = image.value().attr("alt").map(clean_text) {
                if !alt.is_empty() && !is_currency_label(&alt) {
                    return Some(alt);
                }
            }
        }
    }

    if let Some(heading) = card
        .select(&rules.headings)
        .map(element_text)
        .find(|t| !t.is_empty())
    {
        return Some(heading);
    }

    ["title", "aria-label"]
        .iter()
        .filter_map(|attr| card.value().attr(attr))
        .map(clean_text)
        .find(|t| !t.is_empty())
}

fn is_currency_label(text: &str) -> bool {
    let lower = text.to_lowercase();
    CURRENCY_ALT_TEXTS.iter().any(|c| lower == *c)
}

fn resolve_price(
    card: ElementRef,
    selectors: &[Selector],
    patterns: &[regex::Regex],
) -> Option<f64> {
    for selector in selectors {
        for element in card.select(selector) {
            if let Some(price) = price_from_element(element) {
                return Some(price);
            }
        }
    }

    if patterns.is_empty() {
        return None;
    }
    let markup = card.inner_html();
    patterns
        .iter()
        .find_map(|pattern| price_from_pattern(pattern, &markup))
}

fn resolve_href(card: ElementRef, rules: &StoreRules) -> Option<String> {
    if let Some(selector) = &rules.product_link {
        if let Some(href) = card
            .select(selector)
            .filter_map(|a| a.value().attr("href"))
            .next()
        {
            return Some(href.to_string());
        }
    }

    if let Some(href) = card.value().attr("href") {
        return Some(href.to_string());
    }

    card.select(&rules.anchors)
        .filter_map(|a| a.value().attr("href"))
        .next()
        .map(|h| h.to_string())
}

fn resolve_image(card: ElementRef, selectors: &[Selector]) -> Option<String> {
    for selector in selectors {
        for image in card.select(selector) {
            let element = image.value();
            let candidates = [
                element.attr("src"),
                element.attr("data-src"),
                element.attr("data-lazy-src"),
                element
                    .attr("srcset")
                    .and_then(|s| s.split_whitespace().next()),
            ];
            if let Some(src) = candidates
                .into_iter()
                .flatten()
                .map(str::trim)
                .find(|s| !s.is_empty() && !s.starts_with("data:"))
            {
                return Some(src.to_string());
            }
        }
    }
    None
}

/// Category and subcategory from the page's breadcrumb trail
///
/// A crumb pointing at the site root ("home") is ignored. With two or more
/// remaining crumbs the second-to-last is the category and the last the
/// subcategory; a single crumb is the category alone.
fn breadcrumb_category(
    doc: &Html,
    rules: &StoreRules,
    page_url: &Url,
) -> Option<(String, Option<String>)> {
    let selector = rules.breadcrumbs.as_ref()?;
    let trail: Vec<String> = doc
        .select(selector)
        .filter(|crumb| !is_home_crumb(*crumb, page_url))
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect();

    match trail.len() {
        0 => None,
        1 => Some((trail[0].clone(), None)),
        n => Some((trail[n - 2].clone(), Some(trail[n - 1].clone()))),
    }
}

fn is_home_crumb(crumb: ElementRef, page_url: &Url) -> bool {
    crumb
        .value()
        .attr("href")
        .and_then(|href| resolve_link(href, page_url))
        .map(|url| url.path() == "/" && url.query().is_none())
        .unwrap_or(false)
}
