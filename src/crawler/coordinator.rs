//! Crawl coordinator - main orchestration logic
//!
//! For each selected store the coordinator:
//! - Compiles the store's extraction rules and picks its fetch strategy
//! - Runs category discovery to completion when the taxonomy is unknown or
//!   a rediscovery is requested
//! - Walks every category: page 1 first, then pages 2..N concurrently
//! - Feeds extracted candidates through the product pipeline
//!
//! Per-page and per-item failures are contained and counted. Only a store
//! whose discovery finds nothing, with nothing known before, is aborted.

use crate::config::{Config, StoreConfig};
use crate::crawler::discovery::CategoryDiscoverer;
use crate::crawler::fetcher::{
    build_http_client, ContentClassifier, DirectFetcher, FetchError, PageResult, PageSource,
    PageStatus, Strategy,
};
use crate::crawler::pagination::{follow_up_pages, page_url, PaginationResolver};
use crate::crawler::renderer::{RenderedFetcher, Renderer};
use crate::crawler::retry::{fetch_with_retry, FetchOutcome, FetchTask, RetryPolicy};
use crate::crawler::throttle::DomainThrottle;
use crate::extract::{CategoryContext, ProductExtractor, StoreRules};
use crate::pipeline::{Pipeline, RunContext, RunSummary};
use crate::storage::{open_storage, CategoryRecord, CategoryStore, RunStatus, RunStore};
use crate::{HarvestError, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// What a run should do
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Store ids to crawl; every configured store when empty
    pub stores: Vec<String>,
    /// Rediscover categories even when some are already known
    pub rediscover: bool,
    /// Stop after category discovery
    pub discover_only: bool,
    /// Only crawl categories whose name contains this (case-insensitive)
    pub category_filter: Option<String>,
    pub max_categories: Option<usize>,
}

enum RendererSlot {
    Idle,
    Ready(Arc<Renderer>),
    Unavailable,
}

/// Everything needed to crawl the categories of one store
struct StoreCrawl {
    store: StoreConfig,
    rules: Arc<StoreRules>,
    extractor: ProductExtractor,
    resolver: PaginationResolver,
    primary: Arc<dyn PageSource>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    database_path: PathBuf,
    ctx: Arc<RunContext>,
    throttle: Arc<DomainThrottle>,
    policy: RetryPolicy,
    classifier: ContentClassifier,
    renderer: RendererSlot,
    sources: HashMap<(String, Strategy), Arc<dyn PageSource>>,
}

impl Coordinator {
    /// Creates a coordinator for one run
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash recorded with the run for post-mortem
    pub fn new(config: Config, config_hash: impl Into<String>) -> Self {
        let crawler = &config.crawler;
        let throttle = DomainThrottle::new(
            Duration::from_millis(crawler.domain_delay_ms),
            Duration::from_millis(crawler.throttle_step_ms),
        );

        Self {
            database_path: PathBuf::from(&config.output.database_path),
            config_hash: config_hash.into(),
            ctx: Arc::new(RunContext::new()),
            throttle: Arc::new(throttle),
            policy: RetryPolicy::from_config(crawler),
            classifier: ContentClassifier::new(&config.detection),
            renderer: RendererSlot::Idle,
            sources: HashMap::new(),
            config: Arc::new(config),
        }
    }

    /// Registers a page source for `store`, replacing the built-in one
    ///
    /// A source registered under [`Strategy::Adapter`] becomes the store's
    /// primary source.
    pub fn with_source(mut self, store: &str, strategy: Strategy, source: Arc<dyn PageSource>) -> Self {
        self.sources.insert((store.to_string(), strategy), source);
        self
    }

    pub fn context(&self) -> Arc<RunContext> {
        self.ctx.clone()
    }

    /// Runs discovery and crawling for the selected stores
    ///
    /// The run is recorded in the database with its final counters.
    pub async fn run(&mut self, options: &CrawlOptions) -> Result<RunSummary> {
        let stores = self.select_stores(options)?;
        let ids: Vec<String> = stores.iter().map(|s| s.id.clone()).collect();
        let run_id = open_storage(&self.database_path)?.create_run(&self.config_hash, &ids)?;
        tracing::info!(run_id, "Starting run over {} store(s): {}", ids.len(), ids.join(", "));

        let mut pipeline = Pipeline::new(
            self.ctx.clone(),
            &self.database_path,
            self.config.crawler.batch_size,
        );

        for store in &stores {
            match self.crawl_store(store, options, &mut pipeline).await {
                Ok(()) => {}
                Err(HarvestError::StoreAborted { store, reason }) => {
                    tracing::error!("Aborting store {}: {}", store, reason);
                    RunContext::incr(&self.ctx.stores_aborted);
                }
                Err(e) => {
                    tracing::error!("Store {} failed: {}", store.id, e);
                    RunContext::incr(&self.ctx.stores_aborted);
                }
            }
            pipeline.flush();
        }

        let summary = pipeline.finish();
        self.shutdown_renderer().await;

        let status = if !stores.is_empty() && summary.stores_aborted == stores.len() as u64 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        open_storage(&self.database_path)?.finish_run(run_id, status, &summary.counters())?;
        tracing::info!(
            run_id,
            "Run {}: {} processed, {} saved, {} failed",
            status.to_db_string(),
            summary.items_processed,
            summary.items_saved,
            summary.items_failed
        );

        Ok(summary)
    }

    fn select_stores(&self, options: &CrawlOptions) -> Result<Vec<StoreConfig>> {
        if options.stores.is_empty() {
            return Ok(self.config.stores.clone());
        }
        options
            .stores
            .iter()
            .map(|id| {
                self.config
                    .store(id)
                    .cloned()
                    .ok_or_else(|| HarvestError::UnknownStore(id.clone()))
            })
            .collect()
    }

    async fn crawl_store(
        &mut self,
        store: &StoreConfig,
        options: &CrawlOptions,
        pipeline: &mut Pipeline,
    ) -> Result<()> {
        tracing::info!("Crawling store {} ({})", store.display_name(), store.base_url);
        let rules = Arc::new(StoreRules::compile(store)?);
        let primary = self.primary_source(store, &rules).await?;

        // Discovery completes before any product page of the store is fetched
        let known = open_storage(&self.database_path)?.count_categories(&store.id)?;
        if options.rediscover || options.discover_only || known == 0 {
            let report = CategoryDiscoverer::new(rules.clone())
                .discover(
                    primary.as_ref(),
                    &self.throttle,
                    &self.policy,
                    store.discovery_url(),
                    &self.database_path,
                    self.config.crawler.keep_categories_on_empty,
                )
                .await?;

            if !report.kept_previous {
                RunContext::add(&self.ctx.categories_saved, report.saved);
            }
            RunContext::add(&self.ctx.categories_skipped, report.skipped);

            if report.saved == 0 && report.previously_known == 0 {
                return Err(HarvestError::StoreAborted {
                    store: store.id.clone(),
                    reason: "category discovery found no categories".to_string(),
                });
            }
        }

        if options.discover_only {
            return Ok(());
        }

        let categories = select_categories(
            open_storage(&self.database_path)?.list_categories(&store.id)?,
            options,
        );
        tracing::info!("{} categories to crawl for {}", categories.len(), store.id);

        let crawl = StoreCrawl {
            store: store.clone(),
            extractor: ProductExtractor::new(rules.clone()),
            resolver: PaginationResolver::new(rules.clone(), self.config.crawler.max_pages),
            rules,
            primary,
        };

        let category_delay = Duration::from_millis(self.config.crawler.category_delay_ms);
        for (i, category) in categories.iter().enumerate() {
            if i > 0 && !category_delay.is_zero() {
                tokio::time::sleep(category_delay).await;
            }
            self.crawl_category(&crawl, category, pipeline).await;
        }

        Ok(())
    }

    async fn crawl_category(
        &mut self,
        crawl: &StoreCrawl,
        category: &CategoryRecord,
        pipeline: &mut Pipeline,
    ) {
        let context = CategoryContext::new(category.category.clone(), category.subcategory.clone());
        tracing::info!(
            "Crawling category {} of {}: {}",
            category.category,
            crawl.store.id,
            category.category_url
        );

        let mut source = crawl.primary.clone();
        let page_param = crawl.rules.page_param.as_str();
        let mut first = match self.fetch_first_page(&source, category, page_param).await {
            Some(page) => page,
            None => return,
        };

        if first.is_blocked() {
            RunContext::incr(&self.ctx.pages_blocked);
            if let Some(rendered) = self.escalation_source(crawl, &source).await {
                tracing::warn!(
                    "First page of {} blocked, retrying with the rendered strategy",
                    category.category
                );
                source = rendered;
                first = match self.fetch_first_page(&source, category, page_param).await {
                    Some(page) => page,
                    None => return,
                };
                if first.is_blocked() {
                    RunContext::incr(&self.ctx.pages_blocked);
                }
            }
        }

        if first.is_blocked() {
            tracing::warn!(
                "Category {} of {} is blocked by an anti-bot challenge",
                category.category,
                crawl.store.id
            );
            RunContext::incr(&self.ctx.categories_blocked);
            return;
        }

        RunContext::incr(&self.ctx.pages_fetched);
        let cards = self.process_page(crawl, &first, &context, pipeline);
        if first.status == PageStatus::Empty && cards == 0 {
            tracing::info!("Category {} of {} has no products", category.category, crawl.store.id);
            RunContext::incr(&self.ctx.categories_empty);
            return;
        }

        let first_url = match Url::parse(&first.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Unparsable page URL {}: {}", first.url, e);
                return;
            }
        };
        let total = crawl.resolver.resolve(&first.content, &first_url);
        tracing::debug!("Category {} has {} page(s)", category.category, total);

        if total > 1 {
            self.crawl_follow_up_pages(crawl, category, &context, &source, total, pipeline)
                .await;
        }

        RunContext::incr(&self.ctx.categories_crawled);
    }

    /// Fetches pages 2..=total of a category
    ///
    /// The direct strategy merges results once every page has completed; the
    /// rendered strategy processes each page as it arrives. A 404 or a block
    /// on page k keeps pages after k from being started.
    async fn crawl_follow_up_pages(
        &self,
        crawl: &StoreCrawl,
        category: &CategoryRecord,
        context: &CategoryContext,
        source: &Arc<dyn PageSource>,
        total: u32,
        pipeline: &mut Pipeline,
    ) {
        let pages = match follow_up_pages(&category.category_url, &crawl.rules.page_param, total) {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!("Cannot paginate {}: {}", category.category_url, e);
                return;
            }
        };

        let strategy = source.strategy();
        let limit = match strategy {
            Strategy::Rendered => self.config.crawler.max_browser_sessions,
            Strategy::Direct | Strategy::Adapter => self.config.crawler.workers,
        }
        .max(1) as usize;

        let last_page = Arc::new(AtomicU32::new(u32::MAX));
        let tasks = pages.into_iter().map(|(n, url)| {
            FetchTask::for_page(url, strategy, &category.category, category.subcategory.as_deref(), n)
        });

        let mut fetches = stream::iter(tasks)
            .map(|task| {
                let source = source.clone();
                let throttle = self.throttle.clone();
                let policy = self.policy;
                let last_page = last_page.clone();
                async move {
                    if task.page > last_page.load(Ordering::Relaxed) {
                        return None;
                    }
                    let outcome = fetch_with_retry(source.as_ref(), &throttle, &policy, task).await;
                    if ends_pagination(&outcome.result) {
                        last_page.fetch_min(outcome.task.page, Ordering::Relaxed);
                    }
                    Some(outcome)
                }
            })
            .buffer_unordered(limit);

        match strategy {
            Strategy::Rendered => {
                while let Some(outcome) = fetches.next().await {
                    if let Some(outcome) = outcome {
                        self.handle_follow_up(crawl, context, outcome, pipeline);
                    }
                }
            }
            Strategy::Direct | Strategy::Adapter => {
                let outcomes: Vec<Option<FetchOutcome>> = fetches.collect().await;
                for outcome in outcomes.into_iter().flatten() {
                    self.handle_follow_up(crawl, context, outcome, pipeline);
                }
            }
        }
    }

    fn handle_follow_up(
        &self,
        crawl: &StoreCrawl,
        context: &CategoryContext,
        outcome: FetchOutcome,
        pipeline: &mut Pipeline,
    ) {
        RunContext::add(&self.ctx.retries, outcome.task.retries as u64);
        let page = outcome.task.page;

        match outcome.result {
            Ok(result) if result.is_blocked() => {
                tracing::warn!("Page {} of {} blocked, ending pagination", page, result.url);
                RunContext::incr(&self.ctx.pages_blocked);
            }
            Ok(result) => {
                RunContext::incr(&self.ctx.pages_fetched);
                self.process_page(crawl, &result, context, pipeline);
            }
            Err(FetchError::NotFound { url }) => {
                tracing::debug!("Page {} not found ({}), end of pagination", page, url);
            }
            Err(e) => {
                tracing::warn!("Page {} failed: {}", page, e);
                RunContext::incr(&self.ctx.pages_failed);
            }
        }
    }

    /// Fetches page 1 from the canonical category URL (no page parameter)
    async fn fetch_first_page(
        &self,
        source: &Arc<dyn PageSource>,
        category: &CategoryRecord,
        page_param: &str,
    ) -> Option<PageResult> {
        let url = match page_url(&category.category_url, page_param, 1) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Unparsable category URL {}: {}", category.category_url, e);
                RunContext::incr(&self.ctx.pages_failed);
                return None;
            }
        };
        let task = FetchTask::for_page(
            url,
            source.strategy(),
            &category.category,
            category.subcategory.as_deref(),
            1,
        );
        let outcome = fetch_with_retry(source.as_ref(), &self.throttle, &self.policy, task).await;
        RunContext::add(&self.ctx.retries, outcome.task.retries as u64);

        match outcome.result {
            Ok(page) => Some(page),
            Err(e) => {
                tracing::warn!("First page of {} failed: {}", category.category, e);
                RunContext::incr(&self.ctx.pages_failed);
                None
            }
        }
    }

    /// Extracts a page and feeds its products to the pipeline; returns the card count
    fn process_page(
        &self,
        crawl: &StoreCrawl,
        page: &PageResult,
        context: &CategoryContext,
        pipeline: &mut Pipeline,
    ) -> usize {
        let base = match Url::parse(&page.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Unparsable page URL {}: {}", page.url, e);
                return 0;
            }
        };

        let extraction = crawl.extractor.extract(&page.content, &base, context);
        RunContext::add(&self.ctx.extraction_misses, extraction.misses as u64);
        let cards = extraction.cards_found;
        let candidates = extraction.candidates.len();
        let queued = pipeline.process_all(extraction.candidates);

        tracing::debug!(
            "{}: {} cards, {} candidates, {} queued",
            page.url,
            cards,
            candidates,
            queued
        );
        cards.max(candidates)
    }

    async fn primary_source(
        &mut self,
        store: &StoreConfig,
        rules: &Arc<StoreRules>,
    ) -> Result<Arc<dyn PageSource>> {
        if let Some(adapter) = self.sources.get(&(store.id.clone(), Strategy::Adapter)) {
            return Ok(adapter.clone());
        }
        let strategy = if store.rendering_required {
            Strategy::Rendered
        } else {
            Strategy::Direct
        };
        self.source_for(store, rules, strategy)
            .await?
            .ok_or_else(|| HarvestError::StoreAborted {
                store: store.id.clone(),
                reason: "headless browser unavailable".to_string(),
            })
    }

    /// The rendered source to retry a blocked first page with, if any
    async fn escalation_source(
        &mut self,
        crawl: &StoreCrawl,
        current: &Arc<dyn PageSource>,
    ) -> Option<Arc<dyn PageSource>> {
        if !crawl.store.escalate_on_block || current.strategy() == Strategy::Rendered {
            return None;
        }
        match self.source_for(&crawl.store, &crawl.rules, Strategy::Rendered).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("Cannot escalate {}: {}", crawl.store.id, e);
                None
            }
        }
    }

    async fn source_for(
        &mut self,
        store: &StoreConfig,
        rules: &Arc<StoreRules>,
        strategy: Strategy,
    ) -> Result<Option<Arc<dyn PageSource>>> {
        if let Some(source) = self.sources.get(&(store.id.clone(), strategy)) {
            return Ok(Some(source.clone()));
        }

        let source: Option<Arc<dyn PageSource>> = match strategy {
            Strategy::Direct => {
                let timeout = Duration::from_millis(self.config.crawler.request_timeout_ms);
                let client = build_http_client(&self.config.http, store, timeout)?;
                Some(Arc::new(DirectFetcher::new(client, self.classifier.clone())))
            }
            Strategy::Rendered => self.renderer().await.map(|renderer| {
                Arc::new(RenderedFetcher::new(renderer, rules, self.classifier.clone()))
                    as Arc<dyn PageSource>
            }),
            Strategy::Adapter => None,
        };
        Ok(source)
    }

    /// The shared browser, launched on first use
    async fn renderer(&mut self) -> Option<Arc<Renderer>> {
        match &self.renderer {
            RendererSlot::Ready(renderer) => return Some(renderer.clone()),
            RendererSlot::Unavailable => return None,
            RendererSlot::Idle => {}
        }

        let config = &self.config;
        match Renderer::launch(&config.render, &config.crawler, &config.http).await {
            Ok(renderer) => {
                let renderer = Arc::new(renderer);
                self.renderer = RendererSlot::Ready(renderer.clone());
                Some(renderer)
            }
            Err(e) => {
                tracing::error!("Headless browser unavailable: {}", e);
                self.renderer = RendererSlot::Unavailable;
                None
            }
        }
    }

    async fn shutdown_renderer(&mut self) {
        let slot = std::mem::replace(&mut self.renderer, RendererSlot::Idle);
        if let RendererSlot::Ready(renderer) = slot {
            match Arc::try_unwrap(renderer) {
                Ok(renderer) => renderer.shutdown().await,
                Err(_) => tracing::warn!("Browser still referenced at shutdown, leaving it to drop"),
            }
        }
    }
}

/// True for results after which no later page of the category exists
fn ends_pagination(result: &std::result::Result<PageResult, FetchError>) -> bool {
    match result {
        Ok(page) => page.is_blocked(),
        Err(FetchError::NotFound { .. }) => true,
        Err(_) => false,
    }
}

/// Applies the category filter and cap of a run
fn select_categories(categories: Vec<CategoryRecord>, options: &CrawlOptions) -> Vec<CategoryRecord> {
    let filter = options
        .category_filter
        .as_deref()
        .map(str::to_lowercase)
        .filter(|f| !f.is_empty());

    let selected = categories.into_iter().filter(|c| match &filter {
        Some(f) => {
            c.category.to_lowercase().contains(f.as_str())
                || c.subcategory
                    .as_deref()
                    .map_or(false, |s| s.to_lowercase().contains(f.as_str()))
        }
        None => true,
    });

    match options.max_categories {
        Some(max) => selected.take(max).collect(),
        None => selected.collect(),
    }
}
