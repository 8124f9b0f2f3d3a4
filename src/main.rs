//! Grocery-Harvest main entry point
//!
//! This is the command-line interface for the Grocery-Harvest catalog crawler.

use anyhow::Context;
use clap::Parser;
use grocery_harvest::config::{load_config_with_hash, Config};
use grocery_harvest::crawler::{Coordinator, CrawlOptions};
use grocery_harvest::output::{load_statistics, print_run_summary, print_statistics};
use grocery_harvest::storage::SqliteStorage;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Grocery-Harvest: a grocery storefront catalog crawler
///
/// Discovers the category taxonomy of each configured store, walks every
/// category listing and keeps an idempotently updated product catalog in
/// SQLite.
#[derive(Parser, Debug)]
#[command(name = "grocery-harvest")]
#[command(version)]
#[command(about = "A grocery storefront catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "discover_only"])]
    dry_run: bool,

    /// Show catalog statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "discover_only"])]
    stats: bool,

    /// Only run category discovery
    #[arg(long)]
    discover_only: bool,

    /// Rediscover categories even when some are already known
    #[arg(long)]
    rediscover: bool,

    /// Store id to crawl (repeatable); all stores when omitted
    #[arg(long = "store", value_name = "ID")]
    stores: Vec<String>,

    /// Only crawl categories whose name contains this text
    #[arg(long, value_name = "TEXT")]
    category: Option<String>,

    /// Crawl at most this many categories per store
    #[arg(long, value_name = "N")]
    max_categories: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli.stores)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        let options = CrawlOptions {
            stores: cli.stores,
            rediscover: cli.rediscover,
            discover_only: cli.discover_only,
            category_filter: cli.category,
            max_categories: cli.max_categories,
        };
        handle_crawl(config, config_hash, options).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("grocery_harvest=info,warn"),
            1 => EnvFilter::new("grocery_harvest=debug,info"),
            2 => EnvFilter::new("grocery_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, selected: &[String]) -> anyhow::Result<()> {
    println!("=== Grocery-Harvest Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Workers: {}", crawler.workers);
    println!("  Browser sessions: {}", crawler.max_browser_sessions);
    println!(
        "  Retries: {} (backoff base {}ms)",
        crawler.max_retries, crawler.backoff_base_ms
    );
    println!("  Domain delay: {}ms", crawler.domain_delay_ms);
    println!("  Batch size: {}", crawler.batch_size);
    if let Some(max_pages) = crawler.max_pages {
        println!("  Max pages per category: {}", max_pages);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    for id in selected {
        if config.store(id).is_none() {
            anyhow::bail!("unknown store: {}", id);
        }
    }

    println!("\nStores ({}):", config.stores.len());
    for store in &config.stores {
        let marker = if selected.is_empty() || selected.contains(&store.id) {
            "*"
        } else {
            "-"
        };
        let strategy = if store.rendering_required {
            "rendered"
        } else {
            "direct"
        };
        println!(
            "  {} {} ({}) via {}: {}",
            marker,
            store.id,
            store.display_name(),
            strategy,
            store.discovery_url()
        );
        if !store.exclude_url_substrings.is_empty() {
            println!("      excludes: {}", store.exclude_url_substrings.join(", "));
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("failed to open catalog database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: String, options: CrawlOptions) -> anyhow::Result<()> {
    if options.discover_only {
        tracing::info!("Running category discovery only");
    }

    let mut coordinator = Coordinator::new(config, config_hash);
    let summary = coordinator.run(&options).await?;
    print_run_summary(&summary);

    Ok(())
}
