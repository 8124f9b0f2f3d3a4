//! In-run duplicate suppression
//!
//! Overlapping listing pages can surface the same product twice within a
//! run. Repeats across runs are left to the storage upsert.

use crate::pipeline::{Rejection, RunContext};
use crate::storage::ProductRecord;

/// Rejects records whose identity was already accepted in this run
pub fn check_duplicate(ctx: &RunContext, record: &ProductRecord) -> Result<(), Rejection> {
    if ctx.mark_seen(&record.product_id) {
        Ok(())
    } else {
        RunContext::incr(&ctx.duplicates);
        Err(Rejection::Duplicate)
    }
}
