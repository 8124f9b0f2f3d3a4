//! Configuration module for Grocery-Harvest
//!
//! Handles loading, parsing and validating the TOML configuration: crawler
//! limits, the header set, content fingerprints, browser settings and the
//! per-store selector tables.

mod parser;
mod types;
mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use types::*;
pub use validation::validate;
