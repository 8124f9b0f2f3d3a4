//! Database schema definitions
//!
//! Categories and products carry UNIQUE constraints matching their natural
//! keys so that writes can be expressed as `ON CONFLICT ... DO UPDATE`.
//! `subcategory` on categories is stored as `''` for "none" because SQLite
//! treats NULLs as distinct inside a UNIQUE constraint.

/// Current schema version
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    stores TEXT NOT NULL,
    status TEXT NOT NULL,
    items_processed INTEGER NOT NULL DEFAULT 0,
    items_saved INTEGER NOT NULL DEFAULT 0,
    items_failed INTEGER NOT NULL DEFAULT 0,
    duplicates INTEGER NOT NULL DEFAULT 0,
    categories_saved INTEGER NOT NULL DEFAULT 0,
    categories_skipped INTEGER NOT NULL DEFAULT 0
);

-- Category taxonomy per store
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store TEXT NOT NULL,
    category TEXT NOT NULL,
    subcategory TEXT NOT NULL DEFAULT '',
    category_url TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    UNIQUE(store, category, subcategory)
);

CREATE INDEX IF NOT EXISTS idx_categories_store ON categories(store);

-- Product catalog
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL,
    name TEXT NOT NULL CHECK (length(name) > 0),
    price REAL NOT NULL CHECK (price > 0),
    original_price REAL,
    discount_percentage REAL NOT NULL DEFAULT 0,
    category TEXT,
    subcategory TEXT,
    store TEXT NOT NULL,
    url TEXT NOT NULL,
    image_url TEXT,
    scraped_at TEXT NOT NULL,
    UNIQUE(name, store, url)
);

CREATE INDEX IF NOT EXISTS idx_products_store ON products(store);
CREATE INDEX IF NOT EXISTS idx_products_product_id ON products(product_id);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
