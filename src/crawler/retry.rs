//! Retry with exponential backoff around a single page source

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FetchError, PageResult, PageSource, Strategy};
use crate::crawler::throttle::DomainThrottle;
use crate::state::ThrottleSignal;
use crate::url::domain_of;
use std::time::Duration;

/// Cap on a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// One page to fetch, with the retries spent on it so far
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub url: String,
    pub strategy: Strategy,
    pub retries: u32,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    /// 1-based page index within the category; 0 for non-listing pages
    pub page: u32,
}

impl FetchTask {
    pub fn new(url: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            url: url.into(),
            strategy,
            retries: 0,
            category: None,
            subcategory: None,
            page: 0,
        }
    }

    pub fn for_page(
        url: impl Into<String>,
        strategy: Strategy,
        category: &str,
        subcategory: Option<&str>,
        page: u32,
    ) -> Self {
        Self {
            category: Some(category.to_string()),
            subcategory: subcategory.map(str::to_string),
            page,
            ..Self::new(url, strategy)
        }
    }
}

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_base
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

/// Final state of a task after the retry loop
#[derive(Debug)]
pub struct FetchOutcome {
    pub task: FetchTask,
    pub result: Result<PageResult, FetchError>,
}

/// Fetches `task` through `source`, retrying transient failures
///
/// Every attempt waits for its turn on the domain throttle. A 429 or 403
/// raises the domain delay in proportion to the retries spent. Permanent
/// failures and classified pages (including blocked ones) are returned
/// without retry. When the budget is spent the result is
/// [`FetchError::Exhausted`].
pub async fn fetch_with_retry(
    source: &dyn PageSource,
    throttle: &DomainThrottle,
    policy: &RetryPolicy,
    mut task: FetchTask,
) -> FetchOutcome {
    let domain = domain_of(&task.url);
    let max_retries = if source.handles_retries() {
        0
    } else {
        policy.max_retries
    };

    loop {
        throttle.wait_turn(&domain).await;

        match source.fetch(&task.url).await {
            Ok(page) => {
                return FetchOutcome {
                    task,
                    result: Ok(page),
                }
            }
            Err(FetchError::Transient { status, reason, .. }) => {
                if let Some(signal) = status.and_then(ThrottleSignal::from_status) {
                    throttle.raise(&domain, signal, task.retries + 1).await;
                }

                if task.retries >= max_retries {
                    tracing::warn!(
                        url = %task.url,
                        attempts = task.retries + 1,
                        "Giving up: {}",
                        reason
                    );
                    let result = Err(FetchError::Exhausted {
                        url: task.url.clone(),
                        attempts: task.retries + 1,
                        last: reason,
                    });
                    return FetchOutcome { task, result };
                }

                task.retries += 1;
                let delay = policy.backoff_for(task.retries);
                tracing::warn!(
                    url = %task.url,
                    attempt = task.retries,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transient fetch failure, retrying: {}",
                    reason
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return FetchOutcome {
                    task,
                    result: Err(e),
                }
            }
        }
    }
}
