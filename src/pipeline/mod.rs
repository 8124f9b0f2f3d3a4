//! Validation, deduplication and persistence of extracted products
//!
//! Every candidate passes the three stages in order; a rejection at one
//! stage keeps it from the later ones. Rejections are counted on the
//! [`RunContext`] and logged, never propagated.

mod context;
mod dedup;
mod persistence;
mod validation;

pub use context::{RunContext, RunSummary};
pub use dedup::check_duplicate;
pub use persistence::BatchWriter;
pub use validation::{discount_percentage, product_identity, validate};

use crate::extract::ProductCandidate;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Why a candidate did not reach persistence
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid: {0}")]
    Invalid(String),

    #[error("duplicate in this run")]
    Duplicate,
}

impl Rejection {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Rejection::Invalid(reason.into())
    }
}

/// The per-run product pipeline
pub struct Pipeline {
    ctx: Arc<RunContext>,
    writer: BatchWriter,
}

impl Pipeline {
    pub fn new(ctx: Arc<RunContext>, database_path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            ctx,
            writer: BatchWriter::new(database_path, batch_size),
        }
    }

    pub fn context(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    /// Runs one candidate through validation and dedup, queueing it for writing
    pub fn process(&mut self, candidate: ProductCandidate) -> Result<(), Rejection> {
        RunContext::incr(&self.ctx.items_processed);
        let scraped_at = chrono::Utc::now().to_rfc3339();

        let record = match validate(candidate, &scraped_at) {
            Ok(record) => record,
            Err(rejection) => {
                if let Rejection::Invalid(reason) = &rejection {
                    tracing::debug!("Dropping product: {}", reason);
                    self.ctx.record_rejection(reason);
                }
                return Err(rejection);
            }
        };

        check_duplicate(&self.ctx, &record)?;
        self.writer.push(record, &self.ctx);
        Ok(())
    }

    /// Processes a page worth of candidates; returns how many were queued
    pub fn process_all(&mut self, candidates: Vec<ProductCandidate>) -> usize {
        candidates
            .into_iter()
            .map(|c| self.process(c))
            .filter(Result::is_ok)
            .count()
    }

    /// Writes whatever is still pending
    pub fn flush(&mut self) {
        self.writer.flush(&self.ctx);
    }

    /// Flushes and returns the run counters
    pub fn finish(mut self) -> RunSummary {
        self.flush();
        self.ctx.summary()
    }
}
