use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates the store configuration at `path`
///
/// # Errors
///
/// `ConfigError::Io` when the file cannot be read, `ConfigError::Parse` for
/// malformed TOML and one of the validation variants for rule violations.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use grocery_harvest::config::load_config;
///
/// let config = load_config(Path::new("stores.toml")).unwrap();
/// for store in &config.stores {
///     println!("{} -> {}", store.id, store.discovery_url());
/// }
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&std::fs::read_to_string(path)?)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of the configuration file at `path`
///
/// Recorded with every run so that a summary can be traced back to the
/// selector tables that produced it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_text(&std::fs::read_to_string(path)?))
}

/// Loads the configuration and hashes the exact text that was parsed
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_text(&content)))
}

fn hash_text(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", text).unwrap();
        file
    }

    const VALID: &str = r#"
[crawler]
workers = 3
max-retries = 2

[output]
database-path = "./test.db"

[[store]]
id = "varus"
base-url = "https://varus.ua"
rendering-required = true
exclude-url-substrings = ["promo"]

[store.selectors]
categories = [".a-megamenu-item--main a"]
product-cards = [".sf-product-card"]
titles = [".sf-product-card__title"]
prices = [".sf-price__regular", ".sf-price__special"]
last-page = '[data-transaction-name="Pagination - Go To Last"]'
breadcrumbs = ".breadcrumbs a"

[[store]]
id = "atb"
base-url = "https://www.atbmarket.com"

[store.selectors]
categories = ["a.category-menu__link"]
product-cards = ["article.catalog-item"]
price-patterns = ['(\d+)\.<span class="product-price__coin">(\d+)</span>']
"#;

    #[test]
    fn test_load_valid_config() {
        let file = write_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.workers, 3);
        assert_eq!(config.crawler.max_retries, 2);
        assert_eq!(config.crawler.batch_size, 100);
        assert_eq!(config.stores.len(), 2);

        let varus = config.store("varus").unwrap();
        assert!(varus.rendering_required);
        assert_eq!(varus.exclude_url_substrings, vec!["promo".to_string()]);
        assert_eq!(varus.selectors.page_param, "page");
        assert_eq!(varus.selectors.images, vec!["img".to_string()]);

        let atb = config.store("atb").unwrap();
        assert!(!atb.rendering_required);
        assert!(atb.escalate_on_block);
        assert_eq!(atb.selectors.price_patterns.len(), 1);
    }

    #[test]
    fn test_defaults_for_detection_and_http() {
        let config = parse_config(VALID).unwrap();
        assert!(config
            .detection
            .challenge_fingerprints
            .iter()
            .any(|f| f == "just a moment"));
        assert!(config
            .detection
            .empty_fingerprints
            .iter()
            .any(|f| f == "немає товарів"));
        assert!(config.http.accept_language.starts_with("uk-UA"));
        assert!(config.render.headless);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/stores.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let file = write_config("[[store]\nid = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_out_of_range_value_fails_validation() {
        let file = write_config(&VALID.replace("workers = 3", "workers = 0"));
        assert!(matches!(load_config(file.path()), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_hash_tracks_file_content() {
        let a = write_config("id = 1");
        let b = write_config("id = 2");

        let first = compute_config_hash(a.path()).unwrap();
        assert_eq!(first, compute_config_hash(a.path()).unwrap());
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, compute_config_hash(b.path()).unwrap());
    }

    #[test]
    fn test_loaded_hash_matches_file_hash() {
        let file = write_config(VALID);
        let (config, hash) = load_config_with_hash(file.path()).unwrap();
        assert_eq!(config.stores.len(), 2);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());
    }

    #[test]
    fn test_shipped_example_config_is_valid() {
        let config = parse_config(include_str!("../../stores.example.toml")).unwrap();
        let ids: Vec<&str> = config.stores.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["varus", "silpo", "metro", "atb"]);
        assert!(config.store("metro").unwrap().selectors.embedded_state);
        assert!(!config.store("atb").unwrap().rendering_required);
    }
}
