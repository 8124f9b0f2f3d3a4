//! Products from an embedded JSON state blob
//!
//! Some storefronts ship the catalog page as a hydration payload
//! (`window.__INITIAL_STATE__ = {...}` or `<script id="__NEXT_DATA__">`) and
//! render cards client-side. When no card matches and the store opts in, the
//! payload is walked for objects carrying a name and a price.

use crate::extract::price::parse_price_text;
use crate::extract::{clean_text, ProductParts};
use scraper::Html;
use serde_json::{Map, Value};

use super::rules::StoreRules;

const STATE_MARKERS: &[&str] = &["__INITIAL_STATE__", "__PRELOADED_STATE__"];
const NAME_KEYS: &[&str] = &["name", "title"];
const PRICE_KEYS: &[&str] = &["price", "currentPrice", "salePrice"];
const ORIGINAL_PRICE_KEYS: &[&str] = &["oldPrice", "originalPrice", "regularPrice"];
const URL_KEYS: &[&str] = &["url", "link", "href"];
const IMAGE_KEYS: &[&str] = &["image", "imageUrl", "img", "photo"];
const MAX_DEPTH: usize = 16;

/// Collects product-shaped objects from the page's state payloads
pub(crate) fn embedded_products(doc: &Html, rules: &StoreRules) -> Vec<ProductParts> {
    let mut items = Vec::new();
    for script in doc.select(&rules.scripts) {
        let text: String = script.text().collect();
        let state = if script.value().id() == Some("__NEXT_DATA__") {
            serde_json::from_str::<Value>(text.trim()).ok()
        } else {
            state_after_marker(&text)
        };
        if let Some(state) = state {
            collect(&state, 0, &mut items);
        }
    }

    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert((item.name.clone(), item.href.clone())));
    items
}

/// Parses the first JSON object following a known state marker
fn state_after_marker(script: &str) -> Option<Value> {
    let marker_end = STATE_MARKERS
        .iter()
        .find_map(|m| script.find(m).map(|pos| pos + m.len()))?;
    let rest = &script[marker_end..];
    let start = rest.find('{')?;
    serde_json::Deserializer::from_str(&rest[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}

fn collect(value: &Value, depth: usize, out: &mut Vec<ProductParts>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            if let Some(item) = product_from_object(map) {
                out.push(item);
                return;
            }
            for child in map.values() {
                collect(child, depth + 1, out);
            }
        }
        Value::Array(values) => {
            for child in values {
                collect(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn product_from_object(map: &Map<String, Value>) -> Option<ProductParts> {
    let name = NAME_KEYS
        .iter()
        .filter_map(|k| map.get(*k)?.as_str())
        .map(clean_text)
        .find(|n| !n.is_empty())?;
    let price = PRICE_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(json_price))?;

    Some(ProductParts {
        name,
        price,
        original_price: ORIGINAL_PRICE_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(json_price)),
        href: string_field(map, URL_KEYS),
        image_src: string_field(map, IMAGE_KEYS),
    })
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| map.get(*k)?.as_str())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn json_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| *v > 0.0),
        Value::String(s) => parse_price_text(s),
        Value::Object(map) => ["value", "amount", "current"]
            .iter()
            .find_map(|k| match map.get(*k) {
                Some(Value::Number(n)) => n.as_f64().filter(|v| *v > 0.0),
                Some(Value::String(s)) => parse_price_text(s),
                _ => None,
            }),
        _ => None,
    }
}
