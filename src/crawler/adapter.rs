//! Externally supplied fetchers
//!
//! Some stores are reached through a third-party fetching service with its
//! own retry and backoff. Such a fetcher only has to hand back raw markup;
//! classification happens here and the retry layer leaves it alone.

use crate::crawler::fetcher::{ContentClassifier, FetchError, PageResult, PageSource, Strategy};
use async_trait::async_trait;

/// A fetcher that returns the markup of `url` or nothing
#[async_trait]
pub trait ExternalFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Option<String>;
}

/// Wraps an [`ExternalFetch`] as a page source
pub struct AdapterSource<A> {
    adapter: A,
    classifier: ContentClassifier,
}

impl<A: ExternalFetch> AdapterSource<A> {
    pub fn new(adapter: A, classifier: ContentClassifier) -> Self {
        Self {
            adapter,
            classifier,
        }
    }
}

#[async_trait]
impl<A: ExternalFetch> PageSource for AdapterSource<A> {
    fn strategy(&self) -> Strategy {
        Strategy::Adapter
    }

    async fn fetch(&self, url: &str) -> Result<PageResult, FetchError> {
        match self.adapter.fetch(url).await {
            Some(markup) if !markup.trim().is_empty() => {
                Ok(self.classifier.classify(url, None, markup))
            }
            _ => Err(FetchError::transient(url, None, "adapter returned no content")),
        }
    }

    fn handles_retries(&self) -> bool {
        true
    }
}
