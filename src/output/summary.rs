//! End-of-run summary

use crate::pipeline::RunSummary;

/// Formats the counters of a finished run as plain text
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str("=== Run Summary ===\n\n");

    out.push_str("Items:\n");
    out.push_str(&format!("  Processed: {}\n", summary.items_processed));
    out.push_str(&format!("  Saved: {}\n", summary.items_saved));
    out.push_str(&format!("  Failed: {}\n", summary.items_failed));
    out.push_str(&format!("  Invalid: {}\n", summary.items_invalid));
    out.push_str(&format!("  Duplicates: {}\n", summary.duplicates));
    out.push_str(&format!("  Extraction misses: {}\n", summary.extraction_misses));
    out.push('\n');

    out.push_str("Categories:\n");
    out.push_str(&format!("  Saved: {}\n", summary.categories_saved));
    out.push_str(&format!("  Skipped: {}\n", summary.categories_skipped));
    out.push_str(&format!("  Crawled: {}\n", summary.categories_crawled));
    out.push_str(&format!("  Empty: {}\n", summary.categories_empty));
    out.push_str(&format!("  Blocked: {}\n", summary.categories_blocked));
    out.push('\n');

    out.push_str("Pages:\n");
    out.push_str(&format!("  Fetched: {}\n", summary.pages_fetched));
    out.push_str(&format!("  Blocked: {}\n", summary.pages_blocked));
    out.push_str(&format!("  Failed: {}\n", summary.pages_failed));
    out.push_str(&format!("  Retries: {}\n", summary.retries));

    if summary.stores_aborted > 0 {
        out.push_str(&format!("\nStores aborted: {}\n", summary.stores_aborted));
    }

    if !summary.rejections.is_empty() {
        out.push_str("\nValidation failures:\n");
        let mut reasons: Vec<_> = summary.rejections.iter().collect();
        reasons.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (reason, count) in reasons {
            out.push_str(&format!("  {}: {}\n", reason, count));
        }
    }

    out
}

pub fn print_run_summary(summary: &RunSummary) {
    println!("{}", format_run_summary(summary));
}
