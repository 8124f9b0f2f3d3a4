//! Storage traits and error types

use crate::storage::{
    BatchWrite, CategoryRecord, ProductRecord, RunCounters, RunRecord, RunStatus,
    StoreCatalogSummary,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent category taxonomy, unique on (store, category, subcategory)
pub trait CategoryStore {
    /// Replaces every category of `store` with `categories`
    ///
    /// Runs as one transaction: the previous set is cleared and the new set
    /// upserted, so duplicate (category, subcategory) pairs collapse into
    /// one row. Returns the number of rows the store holds afterwards.
    fn replace_categories(
        &mut self,
        store: &str,
        categories: &[CategoryRecord],
    ) -> StorageResult<u64>;

    /// Inserts a category or refreshes the URL of an existing one
    fn upsert_category(&mut self, record: &CategoryRecord) -> StorageResult<()>;

    /// Lists the categories of one store in discovery order
    fn list_categories(&self, store: &str) -> StorageResult<Vec<CategoryRecord>>;

    fn count_categories(&self, store: &str) -> StorageResult<u64>;
}

/// Persistent product catalog, unique on (name, store, url)
pub trait ProductStore {
    /// Inserts a product or overwrites the existing row with the same natural key
    fn upsert_product(&mut self, record: &ProductRecord) -> StorageResult<()>;

    /// Upserts a batch in one transaction
    ///
    /// A failing row is recorded in [`BatchWrite::failed`] and the rest of the
    /// batch still commits.
    fn upsert_batch(&mut self, records: &[ProductRecord]) -> StorageResult<BatchWrite>;

    /// Counts products, optionally for a single store
    fn count_products(&self, store: Option<&str>) -> StorageResult<u64>;

    /// Loads a product by its (store, url) identity
    fn get_product(&self, product_id: &str) -> StorageResult<Option<ProductRecord>>;

    /// Per-store totals over categories and products
    fn catalog_summary(&self) -> StorageResult<Vec<StoreCatalogSummary>>;
}

/// Crawl run bookkeeping
pub trait RunStore {
    /// Creates a new run in the `running` state
    fn create_run(&mut self, config_hash: &str, stores: &[String]) -> StorageResult<i64>;

    /// Marks a run finished with its final counters
    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;
}
