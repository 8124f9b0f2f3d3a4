use std::time::{Duration, Instant};

/// Upper bound, in throttle steps, of the delay added after a 429
const RATE_LIMIT_MAX_STEPS: u32 = 10;

/// Tracks the pacing of requests against one domain
///
/// Every fetch worker consults the same state before sending a request, so
/// a 429 or 403 seen by one worker slows down all of them.
#[derive(Debug, Clone, Default)]
pub struct DomainState {
    /// Number of requests made to this domain in the current run
    pub request_count: u32,

    /// Timestamp of the last request to this domain
    pub last_request_time: Option<Instant>,

    /// Extra spacing added on top of the base delay after throttling responses
    pub extra_delay: Duration,

    /// Number of 429/403 responses seen
    pub throttle_events: u32,
}

/// Throttling response class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleSignal {
    /// HTTP 429
    RateLimited,
    /// HTTP 403
    Forbidden,
}

impl ThrottleSignal {
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(Self::RateLimited),
            403 => Some(Self::Forbidden),
            _ => None,
        }
    }
}

impl DomainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request was made to this domain
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Spacing currently required between two requests
    pub fn current_delay(&self, base_delay: Duration) -> Duration {
        base_delay + self.extra_delay
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now. The last request time may
    /// lie in the future when a slot has already been reserved.
    pub fn time_until_next_request(&self, base_delay: Duration, now: Instant) -> Option<Duration> {
        let ready_at = self.last_request_time? + self.current_delay(base_delay);
        let wait = ready_at.saturating_duration_since(now);
        if wait.is_zero() {
            None
        } else {
            Some(wait)
        }
    }

    /// Raises the extra delay after a throttling response
    ///
    /// A 429 adds `min(retries * 2, 10)` steps, a 403 adds `retries * 3`
    /// steps. The delay never shrinks within a run.
    pub fn raise_delay(&mut self, signal: ThrottleSignal, retries: u32, step: Duration) {
        let retries = retries.max(1);
        let steps = match signal {
            ThrottleSignal::RateLimited => (retries * 2).min(RATE_LIMIT_MAX_STEPS),
            ThrottleSignal::Forbidden => retries * 3,
        };
        let delay = step * steps;
        self.throttle_events += 1;
        if delay > self.extra_delay {
            self.extra_delay = delay;
        }
    }
}
