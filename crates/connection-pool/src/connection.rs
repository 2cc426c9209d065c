//! Pooled connections and their metrics

use conduit_core::{ConnectionId, ExchangeId, TenantId, Timestamp, TransportType};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Reconnecting => "RECONNECTING",
            ConnectionStatus::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// Quality counters for one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectionMetrics {
    /// Filled in when a snapshot is taken
    pub uptime_ms: u64,
    pub latency_ms: f64,
    /// Smoothed upper estimate: `max(p95, latency * 0.95 + p95 * 0.05)`
    pub p95_latency_ms: f64,
    /// In `[0, 1]`
    pub error_rate: f64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnection_count: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<Timestamp>,
}

impl ConnectionMetrics {
    const ERROR_STEP: f64 = 0.01;
    const SUCCESS_DECAY: f64 = 0.99;

    pub fn record_success(&mut self, latency_ms: f64) {
        self.latency_ms = latency_ms;
        self.p95_latency_ms = self
            .p95_latency_ms
            .max(latency_ms * 0.95 + self.p95_latency_ms * 0.05);
        self.error_rate *= Self::SUCCESS_DECAY;
    }

    pub fn record_error(&mut self, error: &str, at: Timestamp) {
        self.error_rate = (self.error_rate + Self::ERROR_STEP).min(1.0);
        self.last_error = Some(error.to_string());
        self.last_error_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub exchange: ExchangeId,
    pub tenant: TenantId,
    pub transport: TransportType,
    pub status: ConnectionStatus,
    pub endpoint: String,
    pub connected_at: Timestamp,
    pub last_activity_at: Timestamp,
    pub reconnect_attempts: u32,
    pub metrics: ConnectionMetrics,
}

impl Connection {
    pub fn new(
        tenant: TenantId,
        exchange: ExchangeId,
        transport: TransportType,
        endpoint: String,
        now: Timestamp,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            exchange,
            tenant,
            transport,
            status: ConnectionStatus::Connected,
            endpoint,
            connected_at: now,
            last_activity_at: now,
            reconnect_attempts: 0,
            metrics: ConnectionMetrics::default(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Copy with `uptime_ms` computed against `now`
    pub fn snapshot(&self, now: Timestamp) -> Connection {
        let mut copy = self.clone();
        copy.metrics.uptime_ms = if self.is_connected() {
            (now - self.connected_at).num_milliseconds().max(0) as u64
        } else {
            0
        };
        copy
    }
}

/// Connections for one tenant/exchange
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPool {
    pub tenant: TenantId,
    pub exchange: ExchangeId,
    pub connections: Vec<Connection>,
    pub max_connections: usize,
    pub shutting_down: bool,
}

impl ConnectionPool {
    pub fn new(tenant: TenantId, exchange: ExchangeId, max_connections: usize) -> Self {
        Self {
            tenant,
            exchange,
            connections: Vec::new(),
            max_connections,
            shutting_down: false,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.connections.len() < self.max_connections
    }

    pub fn find_connected(&self, transport: TransportType) -> Option<&Connection> {
        self.connections
            .iter()
            .find(|c| c.transport == transport && c.is_connected())
    }

    pub fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.iter_mut().find(|c| c.id == *id)
    }
}
