//! Storage module for the product catalog
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Category taxonomy replacement per store
//! - Idempotent product upserts keyed by (name, store, url)
//! - Run bookkeeping for post-mortem of interrupted crawls

mod schema;
mod sqlite;
mod traits;

pub use schema::{initialize_schema, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;
pub use traits::{CategoryStore, ProductStore, RunStore, StorageError, StorageResult};

use std::path::Path;

/// Opens (creating if needed) the catalog database
///
/// Stores are opened per operation; callers drop the handle when the
/// operation completes instead of sharing one connection across workers.
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A discovered catalog section
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryRecord {
    pub store: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub category_url: String,
    pub discovered_at: String,
}

/// A validated product row
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// Stable identity derived from (store, url)
    pub product_id: String,
    pub store: String,
    pub name: String,
    pub price: f64,
    pub original_price: Option<f64>,
    pub discount_percentage: f64,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub scraped_at: String,
}

/// Outcome of writing one batch of products
#[derive(Debug, Default)]
pub struct BatchWrite {
    pub saved: u64,
    /// Per-item failures as (product url, error message)
    pub failed: Vec<(String, String)>,
}

/// Per-store catalog totals, used by `--stats`
#[derive(Debug, Clone)]
pub struct StoreCatalogSummary {
    pub store: String,
    pub categories: u64,
    pub products: u64,
    pub last_scraped_at: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub stores: String,
    pub status: RunStatus,
    pub counters: RunCounters,
}

/// Final counters written when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub items_processed: u64,
    pub items_saved: u64,
    pub items_failed: u64,
    pub duplicates: u64,
    pub categories_saved: u64,
    pub categories_skipped: u64,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
