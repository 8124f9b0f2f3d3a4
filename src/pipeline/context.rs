//! Run-scoped state shared by every component of a crawl

use crate::storage::RunCounters;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters and the dedup set of one run
///
/// Shared through an `Arc`; counters are atomics so fetch workers and the
/// pipeline can update them without coordination.
#[derive(Debug, Default)]
pub struct RunContext {
    seen: Mutex<HashSet<String>>,
    rejections: Mutex<BTreeMap<String, u64>>,

    pub items_processed: AtomicU64,
    pub items_saved: AtomicU64,
    pub items_failed: AtomicU64,
    pub items_invalid: AtomicU64,
    pub duplicates: AtomicU64,
    pub extraction_misses: AtomicU64,

    pub categories_saved: AtomicU64,
    pub categories_skipped: AtomicU64,
    pub categories_crawled: AtomicU64,
    pub categories_empty: AtomicU64,
    pub categories_blocked: AtomicU64,

    pub pages_fetched: AtomicU64,
    pub pages_blocked: AtomicU64,
    pub pages_failed: AtomicU64,
    pub retries: AtomicU64,

    pub stores_aborted: AtomicU64,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `key` as seen; returns false when it already was
    pub fn mark_seen(&self, key: &str) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(key.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(key.to_string()),
        }
    }

    pub fn seen_count(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn record_rejection(&self, reason: &str) {
        self.items_invalid.fetch_add(1, Ordering::Relaxed);
        let mut rejections = match self.rejections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *rejections.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn summary(&self) -> RunSummary {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let rejections = match self.rejections.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        RunSummary {
            items_processed: get(&self.items_processed),
            items_saved: get(&self.items_saved),
            items_failed: get(&self.items_failed),
            items_invalid: get(&self.items_invalid),
            duplicates: get(&self.duplicates),
            extraction_misses: get(&self.extraction_misses),
            categories_saved: get(&self.categories_saved),
            categories_skipped: get(&self.categories_skipped),
            categories_crawled: get(&self.categories_crawled),
            categories_empty: get(&self.categories_empty),
            categories_blocked: get(&self.categories_blocked),
            pages_fetched: get(&self.pages_fetched),
            pages_blocked: get(&self.pages_blocked),
            pages_failed: get(&self.pages_failed),
            retries: get(&self.retries),
            stores_aborted: get(&self.stores_aborted),
            rejections,
        }
    }
}

/// Snapshot of a run's counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub items_processed: u64,
    pub items_saved: u64,
    pub items_failed: u64,
    pub items_invalid: u64,
    pub duplicates: u64,
    pub extraction_misses: u64,
    pub categories_saved: u64,
    pub categories_skipped: u64,
    pub categories_crawled: u64,
    pub categories_empty: u64,
    pub categories_blocked: u64,
    pub pages_fetched: u64,
    pub pages_blocked: u64,
    pub pages_failed: u64,
    pub retries: u64,
    pub stores_aborted: u64,
    /// Validation failures by reason
    pub rejections: BTreeMap<String, u64>,
}

impl RunSummary {
    /// The counters persisted with the run record
    pub fn counters(&self) -> RunCounters {
        RunCounters {
            items_processed: self.items_processed,
            items_saved: self.items_saved,
            items_failed: self.items_failed,
            duplicates: self.duplicates,
            categories_saved: self.categories_saved,
            categories_skipped: self.categories_skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_seen() {
        let ctx = RunContext::new();
        assert!(ctx.mark_seen("a"));
        assert!(!ctx.mark_seen("a"));
        assert!(ctx.mark_seen("b"));
        assert_eq!(ctx.seen_count(), 2);
    }

    #[test]
    fn test_summary_reflects_counters() {
        let ctx = RunContext::new();
        RunContext::incr(&ctx.items_processed);
        RunContext::add(&ctx.items_saved, 3);
        ctx.record_rejection("missing price");
        ctx.record_rejection("missing price");

        let summary = ctx.summary();
        assert_eq!(summary.items_processed, 1);
        assert_eq!(summary.items_saved, 3);
        assert_eq!(summary.items_invalid, 2);
        assert_eq!(summary.rejections.get("missing price"), Some(&2));
        assert_eq!(summary.counters().items_saved, 3);
    }
}
