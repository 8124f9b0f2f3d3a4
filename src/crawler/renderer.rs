//! Rendered strategy: headless Chrome through the DevTools protocol
//!
//! One browser process is shared by every store of a run. Each fetch opens
//! a fresh page, blocks heavy resources, navigates, waits until the listing
//! looks ready and returns the serialized DOM. The number of open pages is
//! bounded by a semaphore.

use crate::config::{CrawlerConfig, HttpConfig, RenderConfig};
use crate::crawler::fetcher::{ContentClassifier, FetchError, PageResult, PageSource, Strategy};
use crate::extract::StoreRules;
use crate::{HarvestError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Minimum visible text length that counts as a rendered page
const READY_TEXT_LENGTH: usize = 100;

#[derive(Debug, Clone)]
struct RenderSettings {
    navigation_timeout: Duration,
    ready_timeout: Duration,
    user_agent: String,
    blocked_types: Vec<String>,
    blocked_patterns: Vec<String>,
}

/// Shared headless browser
pub struct Renderer {
    browser: Browser,
    handler: JoinHandle<()>,
    sessions: Arc<Semaphore>,
    settings: RenderSettings,
}

impl Renderer {
    /// Launches Chrome and starts its event loop
    pub async fn launch(
        render: &RenderConfig,
        crawler: &CrawlerConfig,
        http: &HttpConfig,
    ) -> Result<Self> {
        let navigation_timeout = Duration::from_millis(crawler.render_timeout_ms);
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(navigation_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");

        if let Some(lang) = http.accept_language.split(',').next().map(str::trim) {
            if !lang.is_empty() {
                builder = builder.arg(format!("--lang={}", lang));
            }
        }
        if !render.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &render.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let config = builder.build().map_err(HarvestError::Browser)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Browser(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(
            sessions = crawler.max_browser_sessions,
            "Launched headless browser"
        );

        Ok(Self {
            browser,
            handler,
            sessions: Arc::new(Semaphore::new(crawler.max_browser_sessions.max(1) as usize)),
            settings: RenderSettings {
                navigation_timeout,
                ready_timeout: Duration::from_millis(crawler.ready_timeout_ms),
                user_agent: http.user_agent.clone(),
                blocked_types: render
                    .blocked_resource_types
                    .iter()
                    .map(|t| t.to_lowercase())
                    .collect(),
                blocked_patterns: render
                    .blocked_url_patterns
                    .iter()
                    .map(|p| p.to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            },
        })
    }

    /// Closes the browser and stops its event loop
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            tracing::warn!("Failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser process wait failed: {}", e);
        }
        self.handler.abort();
    }
}

/// Rendered page source for one store
pub struct RenderedFetcher {
    renderer: Arc<Renderer>,
    classifier: ContentClassifier,
    ready_script: String,
}

impl RenderedFetcher {
    pub fn new(renderer: Arc<Renderer>, rules: &StoreRules, classifier: ContentClassifier) -> Self {
        Self {
            renderer,
            classifier,
            ready_script: ready_script(&rules.ready, rules.empty_state.as_deref()),
        }
    }

    async fn render(&self, url: &str) -> std::result::Result<PageResult, FetchError> {
        let settings = &self.renderer.settings;
        let page = self
            .renderer
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::transient(url, None, format!("new page: {}", e)))?;
        let mut guard = PageGuard::new(page, url);

        guard.interceptor = Some(
            block_resources(&guard, settings.blocked_types.clone(), settings.blocked_patterns.clone())
                .await
                .map_err(|e| FetchError::transient(url, None, format!("interception: {}", e)))?,
        );

        guard
            .set_user_agent(settings.user_agent.as_str())
            .await
            .map_err(|e| FetchError::transient(url, None, format!("user agent: {}", e)))?;

        guard
            .goto(url)
            .await
            .map_err(|e| FetchError::transient(url, None, format!("navigation: {}", e)))?;

        self.wait_until_ready(&guard, url).await;

        let content = guard
            .content()
            .await
            .map_err(|e| FetchError::transient(url, None, format!("content: {}", e)))?;
        guard.close().await;

        Ok(self.classifier.classify(url, None, content))
    }

    /// Polls the content-ready predicate until it holds or the wait is over
    async fn wait_until_ready(&self, page: &Page, url: &str) {
        let deadline = Instant::now() + self.renderer.settings.ready_timeout;
        loop {
            let ready = match page.evaluate(self.ready_script.as_str()).await {
                Ok(result) => result.into_value::<bool>().unwrap_or(false),
                Err(e) => {
                    tracing::debug!("Ready check failed for {}: {}", url, e);
                    false
                }
            };
            if ready {
                return;
            }
            if Instant::now() >= deadline {
                tracing::debug!("Content not ready for {}, taking the DOM as is", url);
                return;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageSource for RenderedFetcher {
    fn strategy(&self) -> Strategy {
        Strategy::Rendered
    }

    async fn fetch(&self, url: &str) -> std::result::Result<PageResult, FetchError> {
        let _permit = self
            .renderer
            .sessions
            .acquire()
            .await
            .map_err(|_| FetchError::transient(url, None, "browser closed"))?;

        match tokio::time::timeout(self.renderer.settings.navigation_timeout, self.render(url)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::transient(url, None, "render timeout")),
        }
    }
}

/// Closes its page when dropped, including on error and timeout paths
struct PageGuard {
    page: Page,
    url: String,
    interceptor: Option<JoinHandle<()>>,
    closed: bool,
    runtime_handle: tokio::runtime::Handle,
}

impl PageGuard {
    fn new(page: Page, url: &str) -> Self {
        Self {
            page,
            url: url.to_string(),
            interceptor: None,
            closed: false,
            runtime_handle: tokio::runtime::Handle::current(),
        }
    }

    async fn close(mut self) {
        self.closed = true;
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        if let Err(e) = self.page.clone().close().await {
            tracing::warn!("Failed to close page for {}: {}", self.url, e);
        }
    }
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        &self.page
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(task) = self.interceptor.take() {
            task.abort();
        }
        if self.closed {
            return;
        }
        let page = self.page.clone();
        let url = std::mem::take(&mut self.url);
        self.runtime_handle.spawn(async move {
            if let Err(e) = page.close().await {
                tracing::debug!("Page cleanup failed for {}: {}", url, e);
            }
        });
    }
}

/// Pauses every request of `page` and fails the ones not worth loading
async fn block_resources(
    page: &Page,
    blocked_types: Vec<String>,
    blocked_patterns: Vec<String>,
) -> chromiumoxide::error::Result<JoinHandle<()>> {
    let mut paused = page.event_listener::<EventRequestPaused>().await?;
    page.execute(EnableParams::default()).await?;

    let page = page.clone();
    Ok(tokio::spawn(async move {
        while let Some(event) = paused.next().await {
            let url = event.request.url.to_lowercase();
            let kind = resource_type_name(&event.resource_type);
            let blocked = blocked_types.iter().any(|t| t == kind)
                || blocked_patterns.iter().any(|p| url.contains(p.as_str()));

            let sent = if blocked {
                page.execute(FailRequestParams::new(
                    event.request_id.clone(),
                    ErrorReason::BlockedByClient,
                ))
                .await
                .map(|_| ())
            } else {
                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            };
            if sent.is_err() {
                break;
            }
        }
    }))
}

fn resource_type_name(kind: &ResourceType) -> &'static str {
    match kind {
        ResourceType::Document => "document",
        ResourceType::Stylesheet => "stylesheet",
        ResourceType::Image => "image",
        ResourceType::Media => "media",
        ResourceType::Font => "font",
        ResourceType::Script => "script",
        ResourceType::TextTrack => "texttrack",
        ResourceType::Xhr => "xhr",
        ResourceType::Fetch => "fetch",
        ResourceType::Prefetch => "prefetch",
        ResourceType::EventSource => "eventsource",
        ResourceType::WebSocket => "websocket",
        ResourceType::Manifest => "manifest",
        ResourceType::Ping => "ping",
        _ => "other",
    }
}

/// Builds the browser-side content-ready predicate
///
/// Ready when any listed selector matches, the document finished loading
/// with enough visible text, or the empty-state marker is present.
fn ready_script(selectors: &[String], empty_state: Option<&str>) -> String {
    let mut markers: Vec<&str> = selectors.iter().map(String::as_str).collect();
    if let Some(empty) = empty_state {
        markers.push(empty);
    }
    let markers = serde_json::to_string(&markers).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"(() => {{
  const found = {markers}.some((s) => {{
    try {{ return document.querySelector(s) !== null; }} catch (e) {{ return false; }}
  }});
  if (found) return true;
  const text = document.body ? document.body.innerText.trim().length : 0;
  return document.readyState === "complete" && text > {min_text};
}})()"#,
        markers = markers,
        min_text = READY_TEXT_LENGTH
    )
}
