//! SQLite storage implementation

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    CategoryStore, ProductStore, RunStore, StorageError, StorageResult,
};
use crate::storage::{
    BatchWrite, CategoryRecord, ProductRecord, RunCounters, RunRecord, RunStatus,
    StoreCatalogSummary,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const UPSERT_CATEGORY_SQL: &str = "
    INSERT INTO categories (store, category, subcategory, category_url, discovered_at)
    VALUES (?1, ?2, ?3, ?4, ?5)
    ON CONFLICT(store, category, subcategory) DO UPDATE SET
        category_url = excluded.category_url,
        discovered_at = excluded.discovered_at";

const UPSERT_PRODUCT_SQL: &str = "
    INSERT INTO products (
        product_id, name, price, original_price, discount_percentage,
        category, subcategory, store, url, image_url, scraped_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(name, store, url) DO UPDATE SET
        product_id = excluded.product_id,
        price = excluded.price,
        original_price = excluded.original_price,
        discount_percentage = excluded.discount_percentage,
        category = excluded.category,
        subcategory = excluded.subcategory,
        image_url = COALESCE(excluded.image_url, products.image_url),
        scraped_at = excluded.scraped_at";

const SELECT_PRODUCT_COLUMNS: &str = "
    SELECT product_id, store, name, price, original_price, discount_percentage,
           category, subcategory, url, image_url, scraped_at
    FROM products";

const SELECT_RUN_COLUMNS: &str = "
    SELECT id, started_at, finished_at, config_hash, stores, status,
           items_processed, items_saved, items_failed, duplicates,
           categories_saved, categories_skipped
    FROM runs";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates the database at `path` and ensures the schema exists
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn subcategory_to_db(subcategory: &Option<String>) -> &str {
    subcategory.as_deref().unwrap_or("")
}

fn subcategory_from_db(raw: String) -> Option<String> {
    if raw.is_empty() {
        None
    } else {
        Some(raw)
    }
}

fn category_from_row(row: &Row) -> rusqlite::Result<CategoryRecord> {
    Ok(CategoryRecord {
        store: row.get(0)?,
        category: row.get(1)?,
        subcategory: subcategory_from_db(row.get(2)?),
        category_url: row.get(3)?,
        discovered_at: row.get(4)?,
    })
}

fn product_from_row(row: &Row) -> rusqlite::Result<ProductRecord> {
    Ok(ProductRecord {
        product_id: row.get(0)?,
        store: row.get(1)?,
        name: row.get(2)?,
        price: row.get(3)?,
        original_price: row.get(4)?,
        discount_percentage: row.get(5)?,
        category: row.get(6)?,
        subcategory: row.get(7)?,
        url: row.get(8)?,
        image_url: row.get(9)?,
        scraped_at: row.get(10)?,
    })
}

fn run_from_row(row: &Row) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        stores: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Failed),
        counters: RunCounters {
            items_processed: row.get::<_, i64>(6)? as u64,
            items_saved: row.get::<_, i64>(7)? as u64,
            items_failed: row.get::<_, i64>(8)? as u64,
            duplicates: row.get::<_, i64>(9)? as u64,
            categories_saved: row.get::<_, i64>(10)? as u64,
            categories_skipped: row.get::<_, i64>(11)? as u64,
        },
    })
}

impl CategoryStore for SqliteStorage {
    fn replace_categories(
        &mut self,
        store: &str,
        categories: &[CategoryRecord],
    ) -> StorageResult<u64> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM categories WHERE store = ?1", params![store])?;
        {
            let mut stmt = tx.prepare(UPSERT_CATEGORY_SQL)?;
            for record in categories {
                stmt.execute(params![
                    store,
                    record.category,
                    subcategory_to_db(&record.subcategory),
                    record.category_url,
                    record.discovered_at,
                ])?;
            }
        }
        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM categories WHERE store = ?1",
            params![store],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(count as u64)
    }

    fn upsert_category(&mut self, record: &CategoryRecord) -> StorageResult<()> {
        self.conn.execute(
            UPSERT_CATEGORY_SQL,
            params![
                record.store,
                record.category,
                subcategory_to_db(&record.subcategory),
                record.category_url,
                record.discovered_at,
            ],
        )?;
        Ok(())
    }

    fn list_categories(&self, store: &str) -> StorageResult<Vec<CategoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT store, category, subcategory, category_url, discovered_at
             FROM categories WHERE store = ?1 ORDER BY id",
        )?;
        let categories = stmt
            .query_map(params![store], category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn count_categories(&self, store: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM categories WHERE store = ?1",
            params![store],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl ProductStore for SqliteStorage {
    fn upsert_product(&mut self, record: &ProductRecord) -> StorageResult<()> {
        self.conn.execute(
            UPSERT_PRODUCT_SQL,
            params![
                record.product_id,
                record.name,
                record.price,
                record.original_price,
                record.discount_percentage,
                record.category,
                record.subcategory,
                record.store,
                record.url,
                record.image_url,
                record.scraped_at,
            ],
        )?;
        Ok(())
    }

    fn upsert_batch(&mut self, records: &[ProductRecord]) -> StorageResult<BatchWrite> {
        let mut outcome = BatchWrite::default();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_PRODUCT_SQL)?;
            for record in records {
                let result = stmt.execute(params![
                    record.product_id,
                    record.name,
                    record.price,
                    record.original_price,
                    record.discount_percentage,
                    record.category,
                    record.subcategory,
                    record.store,
                    record.url,
                    record.image_url,
                    record.scraped_at,
                ]);
                match result {
                    Ok(_) => outcome.saved += 1,
                    Err(e) => outcome.failed.push((record.url.clone(), e.to_string())),
                }
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn count_products(&self, store: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match store {
            Some(store) => self.conn.query_row(
                "SELECT COUNT(*) FROM products WHERE store = ?1",
                params![store],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    fn get_product(&self, product_id: &str) -> StorageResult<Option<ProductRecord>> {
        let sql = format!("{} WHERE product_id = ?1 ORDER BY id LIMIT 1", SELECT_PRODUCT_COLUMNS);
        let product = self
            .conn
            .query_row(&sql, params![product_id], product_from_row)
            .optional()?;
        Ok(product)
    }

    fn catalog_summary(&self) -> StorageResult<Vec<StoreCatalogSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.store,
                    (SELECT COUNT(*) FROM categories c WHERE c.store = s.store),
                    (SELECT COUNT(*) FROM products p WHERE p.store = s.store),
                    (SELECT MAX(scraped_at) FROM products p WHERE p.store = s.store),
                    (SELECT MIN(price) FROM products p WHERE p.store = s.store),
                    (SELECT MAX(price) FROM products p WHERE p.store = s.store)
             FROM (SELECT store FROM categories UNION SELECT store FROM products) s
             ORDER BY s.store",
        )?;
        let summaries = stmt
            .query_map([], |row| {
                Ok(StoreCatalogSummary {
                    store: row.get(0)?,
                    categories: row.get::<_, i64>(1)? as u64,
                    products: row.get::<_, i64>(2)? as u64,
                    last_scraped_at: row.get(3)?,
                    min_price: row.get(4)?,
                    max_price: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(summaries)
    }
}

impl RunStore for SqliteStorage {
    fn create_run(&mut self, config_hash: &str, stores: &[String]) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, stores, status) VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                config_hash,
                stores.join(","),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        counters: &RunCounters,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2,
                 items_processed = ?3, items_saved = ?4, items_failed = ?5,
                 duplicates = ?6, categories_saved = ?7, categories_skipped = ?8
             WHERE id = ?9",
            params![
                now,
                status.to_db_string(),
                counters.items_processed as i64,
                counters.items_saved as i64,
                counters.items_failed as i64,
                counters.duplicates as i64,
                counters.categories_saved as i64,
                counters.categories_skipped as i64,
                run_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("{} WHERE id = ?1", SELECT_RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("{} ORDER BY id DESC LIMIT 1", SELECT_RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }
}
