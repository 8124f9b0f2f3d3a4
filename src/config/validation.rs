use crate::config::types::{Config, CrawlerConfig, OutputConfig, StoreConfig};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    validate_stores(&config.stores)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.max_browser_sessions < 1 || config.max_browser_sessions > 32 {
        return Err(ConfigError::Validation(format!(
            "max-browser-sessions must be between 1 and 32, got {}",
            config.max_browser_sessions
        )));
    }

    if config.max_retries > 10 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be <= 10, got {}",
            config.max_retries
        )));
    }

    if config.request_timeout_ms == 0 || config.render_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request and render timeouts must be > 0".to_string(),
        ));
    }

    if config.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max-pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates every store table
fn validate_stores(stores: &[StoreConfig]) -> Result<(), ConfigError> {
    if stores.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[store]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for store in stores {
        validate_store(store)?;
        if !seen.insert(store.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate store id '{}'",
                store.id
            )));
        }
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.id.is_empty()
        || !store
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "store id must be non-empty and contain only [a-zA-Z0-9_-], got '{}'",
            store.id
        )));
    }

    validate_http_url(&store.base_url, &store.id)?;
    if let Some(catalog) = &store.catalog_url {
        validate_http_url(catalog, &store.id)?;
    }

    let selectors = &store.selectors;
    if selectors.categories.is_empty() {
        return Err(ConfigError::Validation(format!(
            "store '{}' needs at least one category selector",
            store.id
        )));
    }
    if selectors.product_cards.is_empty() {
        return Err(ConfigError::Validation(format!(
            "store '{}' needs at least one product-cards selector",
            store.id
        )));
    }
    if selectors.prices.is_empty() && selectors.price_patterns.is_empty() {
        return Err(ConfigError::Validation(format!(
            "store '{}' needs prices or price-patterns",
            store.id
        )));
    }
    if selectors.page_param.is_empty() {
        return Err(ConfigError::Validation(format!(
            "store '{}' has an empty page-param",
            store.id
        )));
    }

    let css = selectors
        .categories
        .iter()
        .chain(&selectors.product_cards)
        .chain(&selectors.titles)
        .chain(&selectors.prices)
        .chain(&selectors.original_prices)
        .chain(&selectors.images)
        .chain(&selectors.pagination_items)
        .chain(&selectors.ready)
        .chain(selectors.product_link.iter())
        .chain(selectors.last_page.iter())
        .chain(selectors.breadcrumbs.iter())
        .chain(selectors.empty_state.iter());
    for selector in css {
        validate_selector(selector, &store.id)?;
    }

    for pattern in &selectors.price_patterns {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("store '{}': '{}': {}", store.id, pattern, e))
        })?;
    }

    Ok(())
}

fn validate_http_url(raw: &str, store_id: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        ConfigError::InvalidUrl(format!("store '{}': '{}': {}", store_id, raw, e))
    })?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "store '{}': '{}' must use http or https",
            store_id, raw
        )));
    }
    Ok(())
}

fn validate_selector(selector: &str, store_id: &str) -> Result<(), ConfigError> {
    Selector::parse(selector).map_err(|e| {
        ConfigError::InvalidSelector(format!("store '{}': '{}': {:?}", store_id, selector, e))
    })?;
    Ok(())
}
