//! Per-domain request pacing shared by all fetch workers

use crate::state::{DomainState, ThrottleSignal};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Minimum spacing between requests to one domain, plus adaptive slowdown
///
/// Workers call [`DomainThrottle::wait_turn`] before each request. The slot
/// is reserved under the lock, so concurrent workers line up instead of
/// firing together once the delay expires.
#[derive(Debug)]
pub struct DomainThrottle {
    base_delay: Duration,
    step: Duration,
    states: Mutex<HashMap<String, DomainState>>,
}

impl DomainThrottle {
    pub fn new(base_delay: Duration, step: Duration) -> Self {
        Self {
            base_delay,
            step,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Waits until `domain` may receive another request and records it
    pub async fn wait_turn(&self, domain: &str) {
        let wait = {
            let mut states = self.states.lock().await;
            let state = states.entry(domain.to_string()).or_default();
            let now = Instant::now();
            let wait = state
                .time_until_next_request(self.base_delay, now)
                .unwrap_or(Duration::ZERO);
            // Reserve the slot at the moment the request will actually go out
            state.record_request(now + wait);
            wait
        };

        if !wait.is_zero() {
            tracing::trace!("Pacing {} for {:?}", domain, wait);
            tokio::time::sleep(wait).await;
        }
    }

    /// Slows `domain` down after a 429 or 403
    pub async fn raise(&self, domain: &str, signal: ThrottleSignal, retries: u32) {
        let mut states = self.states.lock().await;
        let state = states.entry(domain.to_string()).or_default();
        let before = state.extra_delay;
        state.raise_delay(signal, retries, self.step);
        if state.extra_delay > before {
            tracing::warn!(
                domain = %domain,
                extra_delay_ms = state.extra_delay.as_millis() as u64,
                "Throttling domain after {:?}",
                signal
            );
        }
    }

    pub async fn extra_delay(&self, domain: &str) -> Duration {
        self.states
            .lock()
            .await
            .get(domain)
            .map(|s| s.extra_delay)
            .unwrap_or(Duration::ZERO)
    }

    pub async fn request_count(&self, domain: &str) -> u32 {
        self.states
            .lock()
            .await
            .get(domain)
            .map(|s| s.request_count)
            .unwrap_or(0)
    }
}
