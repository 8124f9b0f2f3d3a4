//! Batched product writes

use crate::pipeline::RunContext;
use crate::storage::{open_storage, ProductRecord, ProductStore};
use std::path::PathBuf;

/// Accumulates accepted records and writes them in bounded batches
///
/// The database is opened for each flush and closed right after, so no
/// connection outlives a batch.
#[derive(Debug)]
pub struct BatchWriter {
    database_path: PathBuf,
    batch_size: usize,
    pending: Vec<ProductRecord>,
}

impl BatchWriter {
    pub fn new(database_path: impl Into<PathBuf>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            database_path: database_path.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Queues `record`, flushing when the batch is full
    pub fn push(&mut self, record: ProductRecord, ctx: &RunContext) {
        self.pending.push(record);
        if self.pending.len() >= self.batch_size {
            self.flush(ctx);
        }
    }

    /// Writes every pending record
    ///
    /// Failures are counted, never returned: one bad row does not stop the
    /// batch and a failed batch does not stop the run.
    pub fn flush(&mut self, ctx: &RunContext) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);

        let written = open_storage(&self.database_path).and_then(|mut storage| storage.upsert_batch(&batch));
        match written {
            Ok(result) => {
                RunContext::add(&ctx.items_saved, result.saved);
                RunContext::add(&ctx.items_failed, result.failed.len() as u64);
                for (url, error) in &result.failed {
                    tracing::warn!("Failed to persist {}: {}", url, error);
                }
                tracing::debug!(
                    "Flushed batch: {} saved, {} failed",
                    result.saved,
                    result.failed.len()
                );
            }
            Err(e) => {
                RunContext::add(&ctx.items_failed, batch.len() as u64);
                tracing::error!("Failed to write batch of {} products: {}", batch.len(), e);
            }
        }
    }
}
