//! Rate governor
//!
//! Meters outbound operations per (exchange, tenant, category) over fixed
//! one-minute windows. Each window holds back a slice of capacity that only
//! `Critical` requests may use. Requests that are not admitted can be queued
//! per exchange and are released in priority order by
//! [`RateGovernor::process_queue`].

use chrono::{DateTime, Duration, Utc};
use conduit_clock::SystemClock;
use conduit_core::{ExchangeId, RequestId, TenantId, Timestamp};
use conduit_ports::Clock;
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::error::{RateGovernorError, Result};
use crate::queue::{Admission, QueuedRequest, RequestQueue};
use crate::types::{ExchangeRateConfig, Priority, RateCategory, RateLimitCheck, RateLimitState};

/// Length of one accounting window
pub const WINDOW_SECS: i64 = 60;

/// Retry-After applied when the header cannot be parsed
pub const DEFAULT_RETRY_AFTER_MS: u64 = 1_000;

type StateKey = (ExchangeId, TenantId, RateCategory);

/// Result of [`RateGovernor::execute_with_rate_limit`]
#[derive(Debug)]
pub enum RateLimited<T> {
    /// Admitted and executed
    Ready(T),
    /// Queued; `result` resolves once [`RateGovernor::process_queue`] runs it
    Pending {
        request_id: RequestId,
        wait_ms: u64,
        result: oneshot::Receiver<T>,
    },
}

impl<T> RateLimited<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, RateLimited::Ready(_))
    }
}

/// Summary of one [`RateGovernor::process_queue`] pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueProcessed {
    pub executed: usize,
    pub remaining: usize,
}

pub struct RateGovernor {
    clock: Arc<dyn Clock>,
    configs: DashMap<ExchangeId, ExchangeRateConfig>,
    states: DashMap<StateKey, RateLimitState>,
    /// Exchange-wide back-off installed from 429 responses
    retry_after: DashMap<ExchangeId, Timestamp>,
    queues: DashMap<ExchangeId, Mutex<RequestQueue>>,
}

impl RateGovernor {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            configs: DashMap::new(),
            states: DashMap::new(),
            retry_after: DashMap::new(),
            queues: DashMap::new(),
        }
    }

    /// Install limits for an exchange; existing windows restart under them
    pub fn configure(&self, exchange: &ExchangeId, config: ExchangeRateConfig) {
        info!(
            "Rate limits for {}: orders={} queries={} websocket={} weight={} (critical {}%)",
            exchange,
            config.limit_for(RateCategory::Orders),
            config.limit_for(RateCategory::Queries),
            config.limit_for(RateCategory::WebSocket),
            config.limit_for(RateCategory::Weight),
            config.critical_reservation_pct.clamp(0.0, 50.0),
        );
        self.configs.insert(exchange.clone(), config);
        self.states.retain(|(ex, _, _), _| ex != exchange);
    }

    pub fn config(&self, exchange: &ExchangeId) -> ExchangeRateConfig {
        self.configs
            .get(exchange)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Whether one unit for `priority` would be admitted now. Never consumes.
    pub fn check_limit(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
        priority: Priority,
    ) -> RateLimitCheck {
        self.admit(exchange, tenant, category, priority, 1, false)
    }

    /// Record `weight` units of usage
    pub fn consume_limit(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
        weight: u32,
    ) -> RateLimitState {
        self.with_state(exchange, tenant, category, |state, _| {
            state.used = state.used.saturating_add(weight);
            if state.used > state.limit {
                warn!(
                    "{}/{} {} over limit: used {} of {}",
                    exchange, tenant, category, state.used, state.limit
                );
            }
            state.clone()
        })
    }

    /// Check and consume in one step for the same window
    pub fn try_acquire(&self, exchange: &ExchangeId, admission: &Admission) -> RateLimitCheck {
        self.admit(
            exchange,
            &admission.tenant,
            admission.category,
            admission.priority,
            admission.weight,
            true,
        )
    }

    fn admit(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
        priority: Priority,
        weight: u32,
        consume: bool,
    ) -> RateLimitCheck {
        let retry_wait = self.get_retry_after_delay(exchange);

        self.with_state(exchange, tenant, category, |state, now| {
            if retry_wait > 0 {
                debug!(
                    "{}/{} {} denied: retry-after {}ms",
                    exchange, tenant, category, retry_wait
                );
                return RateLimitCheck::denied(
                    0,
                    state.limit,
                    retry_wait,
                    now + Duration::milliseconds(retry_wait as i64),
                );
            }

            let eligible = state.eligible(priority);
            let weight = weight.max(1);
            if eligible >= weight {
                let remaining = if consume {
                    state.used = state.used.saturating_add(weight);
                    eligible - weight
                } else {
                    eligible
                };
                RateLimitCheck::allowed(remaining, state.limit, state.resets_at)
            } else {
                let wait_ms = (state.resets_at - now).num_milliseconds().max(0) as u64;
                debug!(
                    "{}/{} {} denied for {}: eligible {} (used {}/{}, reserved {}), resets in {}ms",
                    exchange,
                    tenant,
                    category,
                    priority,
                    eligible,
                    state.used,
                    state.limit,
                    state.reserved_for_critical,
                    wait_ms
                );
                RateLimitCheck::denied(eligible, state.limit, wait_ms, state.resets_at)
            }
        })
    }

    /// Run `f` on the live window for a key, creating or rolling it first
    ///
    /// The DashMap entry lock serializes access per key.
    fn with_state<R>(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
        f: impl FnOnce(&mut RateLimitState, Timestamp) -> R,
    ) -> R {
        let now = self.clock.now();
        let key = (exchange.clone(), tenant.clone(), category);
        let mut state = self.states.entry(key).or_insert_with(|| {
            let config = self.config(exchange);
            let limit = config.limit_for(category);
            RateLimitState::new(category, limit, config.reserved_for(limit), next_reset(now))
        });
        if now >= state.resets_at {
            state.used = 0;
            state.resets_at = next_reset(now);
        }
        f(&mut state, now)
    }

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// All four category windows for an exchange/tenant
    pub fn get_rate_limit_status(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
    ) -> Vec<RateLimitState> {
        RateCategory::ALL
            .iter()
            .map(|category| self.get_category_status(exchange, tenant, *category))
            .collect()
    }

    pub fn get_category_status(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
    ) -> RateLimitState {
        self.with_state(exchange, tenant, category, |state, _| state.clone())
    }

    /// Usage at or above the exchange's warning threshold
    pub fn is_approaching_limit(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
    ) -> bool {
        let threshold = self.config(exchange).warning_threshold_pct;
        self.with_state(exchange, tenant, category, |state, _| {
            state.usage_pct() >= threshold
        })
    }

    /// Raise the critical reservation by `additional`; total may not exceed half the limit
    pub fn reserve_capacity(
        &self,
        exchange: &ExchangeId,
        tenant: &TenantId,
        category: RateCategory,
        additional: u32,
    ) -> Result<u32> {
        self.with_state(exchange, tenant, category, |state, _| {
            let requested = state.reserved_for_critical.saturating_add(additional);
            if u64::from(requested) * 2 > u64::from(state.limit) {
                return Err(RateGovernorError::ReservationExceeded {
                    category,
                    requested,
                    limit: state.limit,
                });
            }
            state.reserved_for_critical = requested;
            Ok(requested)
        })
    }

    // ------------------------------------------------------------------
    // Retry-After
    // ------------------------------------------------------------------

    /// Block all categories for `exchange` for `delay_ms`
    pub fn handle_rate_limit_response(&self, exchange: &ExchangeId, delay_ms: u64) {
        let until = self.clock.now() + Duration::milliseconds(delay_ms.min(i64::MAX as u64) as i64);
        warn!("{} rate limited by exchange; backing off {}ms", exchange, delay_ms);
        self.retry_after.insert(exchange.clone(), until);
    }

    /// Parse a `Retry-After` header value and apply it; returns the delay used
    pub fn handle_retry_after_header(&self, exchange: &ExchangeId, value: &str) -> u64 {
        let delay_ms = parse_retry_after(value, self.clock.now());
        self.handle_rate_limit_response(exchange, delay_ms);
        delay_ms
    }

    /// Milliseconds left on the exchange back-off, clearing it once expired
    pub fn get_retry_after_delay(&self, exchange: &ExchangeId) -> u64 {
        let Some(until) = self.retry_after.get(exchange).map(|e| *e) else {
            return 0;
        };
        let left = (until - self.clock.now()).num_milliseconds();
        if left <= 0 {
            self.retry_after.remove(exchange);
            0
        } else {
            left as u64
        }
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    pub fn queue_request(
        &self,
        exchange: &ExchangeId,
        admission: Admission,
        operation: impl FnOnce() + Send + 'static,
    ) -> RequestId {
        let request = QueuedRequest::new(admission, self.clock.now(), Box::new(operation));
        debug!(
            "Queued {} for {} ({} {})",
            request.id, exchange, request.admission.category, request.admission.priority
        );
        self.queues
            .entry(exchange.clone())
            .or_default()
            .lock()
            .push(request)
    }

    /// Pop the highest-priority request without checking admission
    pub fn dequeue_request(&self, exchange: &ExchangeId) -> Option<QueuedRequest> {
        self.with_queue(exchange, |queue| queue.pop()).flatten()
    }

    pub fn cancel_request(&self, exchange: &ExchangeId, request_id: RequestId) -> Result<()> {
        match self.with_queue(exchange, |queue| queue.remove(&request_id)).flatten() {
            Some(_) => {
                debug!("Cancelled queued {}", request_id);
                Ok(())
            }
            None => Err(RateGovernorError::UnknownRequest(request_id)),
        }
    }

    pub fn queue_len(&self, exchange: &ExchangeId) -> usize {
        self.with_queue(exchange, |queue| queue.len()).unwrap_or(0)
    }

    /// Run queued requests in priority order while the head is admitted
    ///
    /// Stops at the first head that is denied so lower-priority requests never
    /// overtake it. Operations run after the queue lock is released.
    pub fn process_queue(&self, exchange: &ExchangeId) -> QueueProcessed {
        let mut executed = 0;
        loop {
            let next = self
                .with_queue(exchange, |queue| {
                    let head = queue.peek()?;
                    let check = self.try_acquire(exchange, &head.admission);
                    if check.allowed {
                        queue.pop()
                    } else {
                        None
                    }
                })
                .flatten();

            match next {
                Some(request) => {
                    debug!("Releasing {} for {}", request.id, exchange);
                    request.run();
                    executed += 1;
                }
                None => break,
            }
        }

        let remaining = self.queue_len(exchange);
        if executed > 0 {
            info!(
                "Processed {} queued requests for {} ({} still waiting)",
                executed, exchange, remaining
            );
        }
        QueueProcessed {
            executed,
            remaining,
        }
    }

    fn with_queue<R>(
        &self,
        exchange: &ExchangeId,
        f: impl FnOnce(&mut RequestQueue) -> R,
    ) -> Option<R> {
        let queue = self.queues.get(exchange)?;
        let mut guard = queue.lock();
        Some(f(&mut guard))
    }

    /// Run `operation` now if admitted, otherwise queue it
    ///
    /// Denial is an expected outcome: the caller gets a pending handle with
    /// the estimated wait instead of an error.
    pub fn execute_with_rate_limit<T, F>(
        &self,
        exchange: &ExchangeId,
        admission: Admission,
        operation: F,
    ) -> RateLimited<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let check = self.try_acquire(exchange, &admission);
        if check.allowed {
            return RateLimited::Ready(operation());
        }

        let (tx, rx) = oneshot::channel();
        let request_id = self.queue_request(exchange, admission, move || {
            let _ = tx.send(operation());
        });
        RateLimited::Pending {
            request_id,
            wait_ms: check.wait_ms,
            result: rx,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drop all windows for one exchange/tenant
    pub fn reset(&self, exchange: &ExchangeId, tenant: &TenantId) {
        self.states
            .retain(|(ex, t, _), _| !(ex == exchange && t == tenant));
    }

    /// Drop all windows, back-offs and queued requests. Configuration stays.
    pub fn clear(&self) {
        self.states.clear();
        self.retry_after.clear();
        self.queues.clear();
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

fn next_reset(now: Timestamp) -> Timestamp {
    now + Duration::seconds(WINDOW_SECS)
}

/// Delay in milliseconds from a `Retry-After` value
///
/// Accepts integer seconds or an HTTP date; anything else yields
/// [`DEFAULT_RETRY_AFTER_MS`].
pub fn parse_retry_after(value: &str, now: Timestamp) -> u64 {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return secs.saturating_mul(1_000);
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return (date.with_timezone(&Utc) - now)
            .num_milliseconds()
            .max(0) as u64;
    }
    DEFAULT_RETRY_AFTER_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CategoryLimit;
    use chrono::TimeZone;
    use conduit_clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup(orders_limit: u32) -> (RateGovernor, Arc<ManualClock>, ExchangeId, TenantId) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
        let governor = RateGovernor::new(clock.clone());
        let exchange = ExchangeId::new("binance");
        governor.configure(
            &exchange,
            ExchangeRateConfig::default()
                .with_limit(RateCategory::Orders, CategoryLimit::per_minute(orders_limit)),
        );
        (governor, clock, exchange, TenantId::new("tenant-1"))
    }

    #[test]
    fn test_critical_reservation_scenario() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 9);

        let normal = governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Normal);
        assert!(!normal.allowed);
        assert_eq!(normal.remaining, 0);
        assert!(normal.wait_ms > 0);

        let critical = governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Critical);
        assert!(critical.allowed);
        assert_eq!(critical.remaining, 1);

        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 1);
        let critical = governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Critical);
        assert!(!critical.allowed);
    }

    #[test]
    fn test_check_does_not_consume() {
        let (governor, _, ex, tenant) = setup(10);
        for _ in 0..50 {
            governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Normal);
        }
        let state = governor.get_category_status(&ex, &tenant, RateCategory::Orders);
        assert_eq!(state.used, 0);
        assert_eq!(state.remaining(), 10);
    }

    #[test]
    fn test_window_resets_after_a_minute() {
        let (governor, clock, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 10);

        let denied = governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Critical);
        assert!(!denied.allowed);
        assert_eq!(denied.wait_ms, 60_000);

        clock.advance(Duration::seconds(30));
        let denied = governor.check_limit(&ex, &tenant, RateCategory::Orders, Priority::Critical);
        assert_eq!(denied.wait_ms, 30_000);

        clock.advance(Duration::seconds(30));
        let state = governor.get_category_status(&ex, &tenant, RateCategory::Orders);
        assert_eq!(state.used, 0);
        assert_eq!(state.resets_at, clock.now() + Duration::seconds(60));
        assert!(
            governor
                .check_limit(&ex, &tenant, RateCategory::Orders, Priority::Normal)
                .allowed
        );
    }

    #[test]
    fn test_windows_are_per_tenant_and_category() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 10);

        let other = TenantId::new("tenant-2");
        assert!(
            governor
                .check_limit(&ex, &other, RateCategory::Orders, Priority::Normal)
                .allowed
        );
        assert!(
            governor
                .check_limit(&ex, &tenant, RateCategory::Queries, Priority::Normal)
                .allowed
        );
    }

    #[test]
    fn test_status_covers_all_categories() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Weight, 25);

        let status = governor.get_rate_limit_status(&ex, &tenant);
        assert_eq!(status.len(), 4);
        let orders = &status[0];
        assert_eq!(orders.category, RateCategory::Orders);
        assert_eq!(orders.limit, 10);
        assert_eq!(orders.reserved_for_critical, 1);
        let weight = &status[3];
        assert_eq!(weight.used, 25);
        assert_eq!(weight.remaining(), 5_975);
    }

    #[test]
    fn test_retry_after_blocks_every_category() {
        let (governor, clock, ex, tenant) = setup(10);
        governor.handle_rate_limit_response(&ex, 5_000);

        let check = governor.check_limit(&ex, &tenant, RateCategory::Queries, Priority::Critical);
        assert!(!check.allowed);
        assert_eq!(check.wait_ms, 5_000);
        assert_eq!(governor.get_retry_after_delay(&ex), 5_000);

        clock.advance(Duration::milliseconds(5_000));
        assert_eq!(governor.get_retry_after_delay(&ex), 0);
        assert!(
            governor
                .check_limit(&ex, &tenant, RateCategory::Queries, Priority::Normal)
                .allowed
        );
    }

    #[test]
    fn test_retry_after_header_forms() {
        let (governor, clock, ex, _) = setup(10);
        assert_eq!(governor.handle_retry_after_header(&ex, "3"), 3_000);
        assert_eq!(governor.get_retry_after_delay(&ex), 3_000);

        let date = (clock.now() + Duration::seconds(10)).to_rfc2822();
        assert_eq!(governor.handle_retry_after_header(&ex, &date), 10_000);

        assert_eq!(
            governor.handle_retry_after_header(&ex, "soon"),
            DEFAULT_RETRY_AFTER_MS
        );
        assert_eq!(
            parse_retry_after("Mon, 01 Jan 2024 12:00:30 GMT", clock.now()),
            30_000
        );
        assert_eq!(
            parse_retry_after("Mon, 01 Jan 2024 11:00:00 GMT", clock.now()),
            0
        );
    }

    #[test]
    fn test_reservation_capped_at_half() {
        let (governor, _, ex, tenant) = setup(10);
        assert_eq!(
            governor.reserve_capacity(&ex, &tenant, RateCategory::Orders, 4),
            Ok(5)
        );
        assert_eq!(
            governor.reserve_capacity(&ex, &tenant, RateCategory::Orders, 1),
            Err(RateGovernorError::ReservationExceeded {
                category: RateCategory::Orders,
                requested: 6,
                limit: 10
            })
        );
        let state = governor.get_category_status(&ex, &tenant, RateCategory::Orders);
        assert_eq!(state.reserved_for_critical, 5);
        assert_eq!(state.eligible(Priority::Normal), 5);
    }

    #[test]
    fn test_approaching_limit() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 7);
        assert!(!governor.is_approaching_limit(&ex, &tenant, RateCategory::Orders));
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 1);
        assert!(governor.is_approaching_limit(&ex, &tenant, RateCategory::Orders));
    }

    #[test]
    fn test_configure_restarts_windows() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 10);

        governor.configure(
            &ex,
            ExchangeRateConfig::default()
                .with_limit(RateCategory::Orders, CategoryLimit::per_second(2)),
        );
        let state = governor.get_category_status(&ex, &tenant, RateCategory::Orders);
        assert_eq!(state.limit, 120);
        assert_eq!(state.used, 0);
        assert_eq!(state.reserved_for_critical, 12);
    }

    #[test]
    fn test_unconfigured_exchange_uses_defaults() {
        let governor = RateGovernor::default();
        let state = governor.get_category_status(
            &ExchangeId::new("kraken"),
            &TenantId::new("t"),
            RateCategory::Queries,
        );
        assert_eq!(state.limit, 1_200);
        assert_eq!(state.reserved_for_critical, 120);
    }

    #[test]
    fn test_process_queue_stops_at_denied_head() {
        let (governor, clock, ex, tenant) = setup(4);
        let ran = Arc::new(Mutex::new(Vec::new()));

        for (label, priority) in [
            ("low", Priority::Low),
            ("normal-1", Priority::Normal),
            ("critical", Priority::Critical),
            ("normal-2", Priority::Normal),
            ("high", Priority::High),
        ] {
            let ran = Arc::clone(&ran);
            governor.queue_request(
                &ex,
                Admission::new(tenant.clone(), RateCategory::Orders, priority),
                move || ran.lock().push(label),
            );
        }
        assert_eq!(governor.queue_len(&ex), 5);

        // limit 4, reservation 0 (10% of 4 floors to 0)
        let processed = governor.process_queue(&ex);
        assert_eq!(
            processed,
            QueueProcessed {
                executed: 4,
                remaining: 1
            }
        );
        assert_eq!(
            *ran.lock(),
            vec!["critical", "high", "normal-1", "normal-2"]
        );

        clock.advance(Duration::seconds(60));
        assert_eq!(governor.process_queue(&ex).executed, 1);
        assert_eq!(ran.lock().last(), Some(&"low"));
    }

    #[test]
    fn test_dequeue_and_cancel() {
        let (governor, _, ex, tenant) = setup(10);
        let first = governor.queue_request(
            &ex,
            Admission::new(tenant.clone(), RateCategory::Orders, Priority::Normal),
            || {},
        );
        let second = governor.queue_request(
            &ex,
            Admission::new(tenant.clone(), RateCategory::Orders, Priority::Normal),
            || {},
        );

        assert_eq!(governor.cancel_request(&ex, first), Ok(()));
        assert_eq!(
            governor.cancel_request(&ex, first),
            Err(RateGovernorError::UnknownRequest(first))
        );
        assert_eq!(governor.dequeue_request(&ex).map(|r| r.id), Some(second));
        assert!(governor.dequeue_request(&ex).is_none());
        assert!(governor.dequeue_request(&ExchangeId::new("other")).is_none());
    }

    #[test]
    fn test_execute_with_rate_limit_queues_when_denied() {
        let (governor, clock, ex, tenant) = setup(2);
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |governor: &RateGovernor| {
            let calls = Arc::clone(&calls);
            governor.execute_with_rate_limit(
                &ex,
                Admission::new(tenant.clone(), RateCategory::Orders, Priority::Normal),
                move || calls.fetch_add(1, Ordering::SeqCst) + 1,
            )
        };

        assert!(matches!(run(&governor), RateLimited::Ready(1)));
        assert!(matches!(run(&governor), RateLimited::Ready(2)));

        let RateLimited::Pending {
            wait_ms,
            mut result,
            ..
        } = run(&governor)
        else {
            panic!("third call should be queued");
        };
        assert_eq!(wait_ms, 60_000);
        assert!(result.try_recv().is_err());
        assert_eq!(governor.get_category_status(&ex, &tenant, RateCategory::Orders).used, 2);

        clock.advance(Duration::seconds(60));
        assert_eq!(governor.process_queue(&ex).executed, 1);
        assert_eq!(result.try_recv(), Ok(3));
    }

    #[test]
    fn test_reset_and_clear() {
        let (governor, _, ex, tenant) = setup(10);
        governor.consume_limit(&ex, &tenant, RateCategory::Orders, 5);
        governor.handle_rate_limit_response(&ex, 1_000);
        governor.queue_request(
            &ex,
            Admission::new(tenant.clone(), RateCategory::Orders, Priority::Low),
            || {},
        );

        governor.reset(&ex, &tenant);
        assert_eq!(governor.get_category_status(&ex, &tenant, RateCategory::Orders).used, 0);
        assert_eq!(governor.get_retry_after_delay(&ex), 1_000);

        governor.clear();
        assert_eq!(governor.get_retry_after_delay(&ex), 0);
        assert_eq!(governor.queue_len(&ex), 0);
        // configuration survives
        assert_eq!(governor.get_category_status(&ex, &tenant, RateCategory::Orders).limit, 10);
    }
}
