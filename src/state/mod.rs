//! State module for per-domain request pacing
//!
//! `DomainState` tracks request spacing for one domain, including the extra
//! delay raised by 429/403 responses.

mod domain_state;

pub use domain_state::{DomainState, ThrottleSignal};
