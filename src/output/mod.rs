//! Output module for run summaries and catalog statistics
//!
//! This module handles:
//! - Formatting the end-of-run summary of a crawl
//! - Loading and printing per-store catalog statistics for `--stats`

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};
pub use summary::{format_run_summary, print_run_summary};
