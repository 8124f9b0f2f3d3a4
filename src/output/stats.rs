//! Statistics generation from the catalog database
//!
//! This module provides functionality for extracting and displaying
//! catalog statistics from the storage layer.

use crate::storage::{ProductStore, RunRecord, RunStore, StorageResult, StoreCatalogSummary};

/// Catalog statistics summary
#[derive(Debug, Clone)]
pub struct CatalogStatistics {
    /// Per-store totals, ordered by store id
    pub stores: Vec<StoreCatalogSummary>,

    /// Total number of products across stores
    pub total_products: u64,

    /// Most recent run, if any
    pub latest_run: Option<RunRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
pub fn load_statistics<S>(storage: &S) -> StorageResult<CatalogStatistics>
where
    S: ProductStore + RunStore,
{
    Ok(CatalogStatistics {
        stores: storage.catalog_summary()?,
        total_products: storage.count_products(None)?,
        latest_run: storage.get_latest_run()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CatalogStatistics) {
    println!("=== Catalog Statistics ===\n");

    if let Some(run) = &stats.latest_run {
        println!("Latest run #{} ({}):", run.id, run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Stores: {}", run.stores);
        println!(
            "  Items: {} processed, {} saved, {} failed, {} duplicates",
            run.counters.items_processed,
            run.counters.items_saved,
            run.counters.items_failed,
            run.counters.duplicates
        );
        println!();
    }

    println!("Stores:");
    if stats.stores.is_empty() {
        println!("  (empty catalog)");
    }
    for store in &stats.stores {
        let range = match (store.min_price, store.max_price) {
            (Some(min), Some(max)) => format!("{:.2} - {:.2}", min, max),
            _ => "-".to_string(),
        };
        println!(
            "  {}: {} categories, {} products, prices {}, last scraped {}",
            store.store,
            store.categories,
            store.products,
            range,
            store.last_scraped_at.as_deref().unwrap_or("never")
        );
    }
    println!();
    println!("Total products: {}", stats.total_products);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CategoryRecord, CategoryStore, ProductRecord, SqliteStorage};

    #[test]
    fn test_load_statistics() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .replace_categories(
                "shop",
                &[CategoryRecord {
                    store: "shop".to_string(),
                    category: "Dairy".to_string(),
                    subcategory: None,
                    category_url: "https://shop.example/dairy".to_string(),
                    discovered_at: "t".to_string(),
                }],
            )
            .unwrap();
        storage
            .upsert_product(&ProductRecord {
                product_id: "id".to_string(),
                store: "shop".to_string(),
                name: "Milk".to_string(),
                price: 41.5,
                original_price: None,
                discount_percentage: 0.0,
                category: Some("Dairy".to_string()),
                subcategory: None,
                url: "https://shop.example/p/milk".to_string(),
                image_url: None,
                scraped_at: "2024-01-01T00:00:00Z".to_string(),
            })
            .unwrap();

        let stats = load_statistics(&storage).unwrap();
        assert_eq!(stats.total_products, 1);
        assert_eq!(stats.stores.len(), 1);
        assert_eq!(stats.stores[0].categories, 1);
        assert!(stats.latest_run.is_none());
    }
}
