//! Categories, priorities, limits and admission results

use conduit_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request category metered by its own window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RateCategory {
    Orders,
    Queries,
    #[serde(alias = "WS")]
    WebSocket,
    Weight,
}

impl RateCategory {
    pub const ALL: [RateCategory; 4] = [
        RateCategory::Orders,
        RateCategory::Queries,
        RateCategory::WebSocket,
        RateCategory::Weight,
    ];

    /// Window limit used when an exchange has no configuration for this category
    pub fn default_limit(&self) -> u32 {
        match self {
            RateCategory::Orders => 600,
            RateCategory::Queries => 1_200,
            RateCategory::WebSocket => 300,
            RateCategory::Weight => 6_000,
        }
    }
}

impl fmt::Display for RateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RateCategory::Orders => "ORDERS",
            RateCategory::Queries => "QUERIES",
            RateCategory::WebSocket => "WEBSOCKET",
            RateCategory::Weight => "WEIGHT",
        };
        f.write_str(s)
    }
}

/// Request priority. Variants are declared lowest first so that the derived
/// `Ord` ranks `Critical` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Normal,
    High,
    /// May use capacity reserved for critical traffic (e.g. cancels)
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "LOW",
            Priority::Normal => "NORMAL",
            Priority::High => "HIGH",
            Priority::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Limit for one category, per minute or per second
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryLimit {
    pub requests_per_minute: Option<u32>,
    pub requests_per_second: Option<u32>,
}

impl CategoryLimit {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            requests_per_minute: Some(limit),
            requests_per_second: None,
        }
    }

    pub fn per_second(limit: u32) -> Self {
        Self {
            requests_per_minute: None,
            requests_per_second: Some(limit),
        }
    }

    /// Requests allowed per one-minute window
    pub fn window_limit(&self) -> Option<u32> {
        self.requests_per_minute
            .or_else(|| self.requests_per_second.map(|s| s.saturating_mul(60)))
    }
}

/// Rate limit configuration for one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeRateConfig {
    pub orders: CategoryLimit,
    pub queries: CategoryLimit,
    pub websocket: CategoryLimit,
    pub weight: CategoryLimit,
    /// Share of each window held back for `Critical` requests, clamped to 50
    pub critical_reservation_pct: f64,
    /// Usage share at which a category counts as approaching its limit
    pub warning_threshold_pct: f64,
}

impl Default for ExchangeRateConfig {
    fn default() -> Self {
        Self {
            orders: CategoryLimit::per_minute(RateCategory::Orders.default_limit()),
            queries: CategoryLimit::per_minute(RateCategory::Queries.default_limit()),
            websocket: CategoryLimit::per_minute(RateCategory::WebSocket.default_limit()),
            weight: CategoryLimit::per_minute(RateCategory::Weight.default_limit()),
            critical_reservation_pct: 10.0,
            warning_threshold_pct: 80.0,
        }
    }
}

impl ExchangeRateConfig {
    pub fn with_limit(mut self, category: RateCategory, limit: CategoryLimit) -> Self {
        match category {
            RateCategory::Orders => self.orders = limit,
            RateCategory::Queries => self.queries = limit,
            RateCategory::WebSocket => self.websocket = limit,
            RateCategory::Weight => self.weight = limit,
        }
        self
    }

    pub fn with_critical_reservation_pct(mut self, pct: f64) -> Self {
        self.critical_reservation_pct = pct;
        self
    }

    pub fn with_warning_threshold_pct(mut self, pct: f64) -> Self {
        self.warning_threshold_pct = pct;
        self
    }

    pub fn limit_for(&self, category: RateCategory) -> u32 {
        let limit = match category {
            RateCategory::Orders => self.orders,
            RateCategory::Queries => self.queries,
            RateCategory::WebSocket => self.websocket,
            RateCategory::Weight => self.weight,
        };
        limit
            .window_limit()
            .unwrap_or_else(|| category.default_limit())
    }

    /// Initial critical reservation for a window of `limit`
    pub fn reserved_for(&self, limit: u32) -> u32 {
        let pct = self.critical_reservation_pct.clamp(0.0, 50.0);
        (limit as f64 * pct / 100.0).floor() as u32
    }
}

/// Live accounting for one (exchange, tenant, category) window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    pub category: RateCategory,
    pub limit: u32,
    pub used: u32,
    pub reserved_for_critical: u32,
    pub resets_at: Timestamp,
}

impl RateLimitState {
    pub fn new(category: RateCategory, limit: u32, reserved: u32, resets_at: Timestamp) -> Self {
        Self {
            category,
            limit,
            used: 0,
            reserved_for_critical: reserved,
            resets_at,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    /// Capacity a request of `priority` may use
    pub fn eligible(&self, priority: Priority) -> u32 {
        match priority {
            Priority::Critical => self.remaining(),
            _ => self.remaining().saturating_sub(self.reserved_for_critical),
        }
    }

    /// Used share of the window in percent
    pub fn usage_pct(&self) -> f64 {
        if self.limit == 0 {
            return 100.0;
        }
        self.used as f64 * 100.0 / self.limit as f64
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitCheck {
    pub allowed: bool,
    /// Capacity left for the requesting priority
    pub remaining: u32,
    pub limit: u32,
    /// Suggested wait before retrying; zero when allowed
    pub wait_ms: u64,
    pub resets_at: Timestamp,
}

impl RateLimitCheck {
    pub fn allowed(remaining: u32, limit: u32, resets_at: Timestamp) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            wait_ms: 0,
            resets_at,
        }
    }

    pub fn denied(remaining: u32, limit: u32, wait_ms: u64, resets_at: Timestamp) -> Self {
        Self {
            allowed: false,
            remaining,
            limit,
            wait_ms,
            resets_at,
        }
    }
}
