//! Crawler module for category and listing page fetching
//!
//! This module contains the core crawling logic, including:
//! - Direct and rendered fetch strategies behind one `PageSource` seam
//! - Retry with exponential backoff and per-domain pacing
//! - Category discovery and pagination resolution
//! - Overall crawl coordination

mod adapter;
mod coordinator;
mod discovery;
mod fetcher;
mod pagination;
mod renderer;
mod retry;
mod throttle;

pub use adapter::{AdapterSource, ExternalFetch};
pub use coordinator::{Coordinator, CrawlOptions};
pub use discovery::{CategoryDiscoverer, CategoryScan, DiscoveryReport};
pub use fetcher::{
    build_http_client, is_retryable_status, ContentClassifier, DirectFetcher, FetchError,
    PageResult, PageSource, PageStatus, Strategy,
};
pub use pagination::{follow_up_pages, page_index, page_url, PaginationResolver};
pub use renderer::{RenderedFetcher, Renderer};
pub use retry::{fetch_with_retry, FetchOutcome, FetchTask, RetryPolicy};
pub use throttle::DomainThrottle;
