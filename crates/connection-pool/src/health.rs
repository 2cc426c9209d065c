//! Quality thresholds, health classification and alerts

use conduit_core::{ConnectionId, ExchangeId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::connection::Connection;

/// Per-exchange quality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub max_latency_ms: f64,
    pub max_error_rate: f64,
    /// Pause trading for the tenant/exchange when health is not HEALTHY
    pub pause_trading_on_degradation: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 5_000.0,
            max_error_rate: 0.10,
            pause_trading_on_degradation: true,
        }
    }
}

impl QualityConfig {
    pub fn is_healthy(&self, connection: &Connection) -> bool {
        connection.is_connected()
            && connection.metrics.latency_ms <= self.max_latency_ms
            && connection.metrics.error_rate <= self.max_error_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthLevel {
    /// All healthy, some healthy, or none (an empty pool is unhealthy)
    pub fn classify(healthy: usize, total: usize) -> Self {
        if total == 0 || healthy == 0 {
            HealthLevel::Unhealthy
        } else if healthy == total {
            HealthLevel::Healthy
        } else {
            HealthLevel::Degraded
        }
    }
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthLevel::Healthy => "HEALTHY",
            HealthLevel::Degraded => "DEGRADED",
            HealthLevel::Unhealthy => "UNHEALTHY",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub tenant: TenantId,
    pub exchange: ExchangeId,
    pub level: HealthLevel,
    pub healthy_connections: usize,
    pub total_connections: usize,
    pub trading_paused: bool,
    pub checked_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    HighLatency,
    HighErrorRate,
    ConnectionLost,
    TradingPaused,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertKind::HighLatency => "HIGH_LATENCY",
            AlertKind::HighErrorRate => "HIGH_ERROR_RATE",
            AlertKind::ConnectionLost => "CONNECTION_LOST",
            AlertKind::TradingPaused => "TRADING_PAUSED",
        };
        f.write_str(s)
    }
}

/// Informational alert; nothing in the pool acts on it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolAlert {
    pub kind: AlertKind,
    pub tenant: TenantId,
    pub exchange: ExchangeId,
    pub connection_id: Option<ConnectionId>,
    /// Offending value (latency ms, error rate); zero when not applicable
    pub value: f64,
    pub threshold: f64,
    pub message: String,
    pub timestamp: Timestamp,
}
