//! Required-field checks and record normalization

use crate::extract::{clean_text, ProductCandidate};
use crate::pipeline::Rejection;
use crate::storage::ProductRecord;
use sha2::{Digest, Sha256};
use url::Url;

/// Turns a candidate into a storable record or says why it cannot be one
pub fn validate(candidate: ProductCandidate, scraped_at: &str) -> Result<ProductRecord, Rejection> {
    let store = candidate.store.trim().to_string();
    if store.is_empty() {
        return Err(Rejection::invalid("missing store"));
    }

    let name = clean_text(&candidate.name);
    if name.is_empty() {
        return Err(Rejection::invalid("missing name"));
    }

    if !(candidate.price.is_finite() && candidate.price > 0.0) {
        return Err(Rejection::invalid("non-positive price"));
    }

    let url = match candidate.url.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(Rejection::invalid("missing url")),
    };
    let url = match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.has_host() => u.to_string(),
        _ => return Err(Rejection::invalid("invalid url")),
    };

    let original_price = candidate
        .original_price
        .filter(|p| p.is_finite() && *p > 0.0);

    Ok(ProductRecord {
        product_id: product_identity(&store, &url),
        discount_percentage: discount_percentage(original_price, candidate.price),
        store,
        name,
        price: candidate.price,
        original_price,
        category: candidate.category.map(|c| clean_text(&c)).filter(|c| !c.is_empty()),
        subcategory: candidate
            .subcategory
            .map(|c| clean_text(&c))
            .filter(|c| !c.is_empty()),
        url,
        image_url: candidate.image_url,
        scraped_at: scraped_at.to_string(),
    })
}

/// Stable product identity: hex SHA-256 of `store:url`
pub fn product_identity(store: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(store.as_bytes());
    hasher.update(b":");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

/// Percentage saved against the original price, rounded to two decimals
///
/// Zero unless the original price is above the current one.
pub fn discount_percentage(original_price: Option<f64>, price: f64) -> f64 {
    match original_price {
        Some(original) if original > price => {
            let pct = (original - price) / original * 100.0;
            (pct * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}
