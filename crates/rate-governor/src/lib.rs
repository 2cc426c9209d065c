//! Rate governor
//!
//! In-memory admission control for outbound exchange traffic:
//!
//! - fixed one-minute windows per (exchange, tenant, [`RateCategory`])
//! - capacity reserved for [`Priority::Critical`] requests
//! - exchange-wide back-off from `429`/`Retry-After` responses
//! - a priority queue per exchange for requests that must wait
//!
//! A denied request is never an error: checks return a [`RateLimitCheck`]
//! carrying the wait estimate, and [`RateGovernor::execute_with_rate_limit`]
//! queues the work and hands back a pending result.

mod error;
mod governor;
mod queue;
mod types;

pub use error::{RateGovernorError, Result};
pub use governor::{
    DEFAULT_RETRY_AFTER_MS, QueueProcessed, RateGovernor, RateLimited, WINDOW_SECS,
    parse_retry_after,
};
pub use queue::{Admission, DeferredOp, QueuedRequest, RequestQueue};
pub use types::{
    CategoryLimit, ExchangeRateConfig, Priority, RateCategory, RateLimitCheck, RateLimitState,
};
