//! URL helpers shared by discovery, extraction and the fetch throttle

use url::Url;

/// Resolves an href found on a page into an absolute http(s) URL
///
/// Returns `None` for empty hrefs, fragment-only anchors and
/// non-navigational schemes (`javascript:`, `mailto:`, `tel:`, `data:`).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use grocery_harvest::url::resolve_link;
///
/// let base = Url::parse("https://shop.example/catalog/milk").unwrap();
/// let url = resolve_link("/product/42", &base).unwrap();
/// assert_eq!(url.as_str(), "https://shop.example/product/42");
/// assert!(resolve_link("#top", &base).is_none());
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    let mut absolute = base_url.join(href).ok()?;
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    absolute.set_fragment(None);
    Some(absolute)
}

/// Extracts the lowercase host of a URL
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the host of a raw URL string, falling back to the input itself
pub fn domain_of(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| extract_domain(&u))
        .unwrap_or_else(|| raw.to_string())
}

/// Returns the first exclusion substring contained in `url`, case-insensitively
pub fn matching_exclusion<'a>(url: &str, exclusions: &'a [String]) -> Option<&'a str> {
    let lower = url.to_lowercase();
    exclusions
        .iter()
        .map(|s| s.as_str())
        .filter(|s| !s.is_empty())
        .find(|s| lower.contains(&s.to_lowercase()))
}
