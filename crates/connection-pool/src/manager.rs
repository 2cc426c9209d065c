//! Connection manager
//!
//! Owns every tenant/exchange pool, the per-exchange quality and reconnection
//! settings, the in-flight request registry and the alert channel. Pools are
//! stored in a `DashMap`, so acquire-or-create for one tenant/exchange runs
//! under that entry's lock while other pools proceed independently.

use conduit_clock::SystemClock;
use conduit_core::{
    ConnectionId, ExchangeId, ReconnectPolicy, TenantId, Timestamp, TransportType, backoff_delay,
};
use conduit_ports::Clock;
use dashmap::{DashMap, DashSet};
use futures_util::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout_at};

use crate::connection::{Connection, ConnectionMetrics, ConnectionPool, ConnectionStatus};
use crate::error::{PoolError, Result};
use crate::health::{AlertKind, HealthLevel, HealthReport, PoolAlert, QualityConfig};
use crate::inflight::{PoolKey, Registry, RequestHandle, RequestOutcome};

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
const ALERT_BUFFER: usize = 1_024;

/// Result of [`ConnectionManager::graceful_shutdown`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub pools_closed: usize,
    pub connections_closed: usize,
    pub requests_completed: usize,
    pub requests_failed: usize,
    /// Still outstanding at the deadline and force-rejected
    pub requests_cancelled: usize,
    pub elapsed_ms: u64,
}

enum Drained {
    Completed,
    Failed,
    Cancelled,
}

pub struct ConnectionManager {
    clock: Arc<dyn Clock>,
    pools: DashMap<PoolKey, ConnectionPool>,
    /// connection id -> owning pool
    index: DashMap<ConnectionId, PoolKey>,
    inflight: Arc<Registry>,
    quality: DashMap<ExchangeId, QualityConfig>,
    strategies: DashMap<ExchangeId, ReconnectPolicy>,
    endpoints: DashMap<(ExchangeId, TransportType), String>,
    max_connections: DashMap<ExchangeId, usize>,
    paused: DashSet<PoolKey>,
    alerts: broadcast::Sender<PoolAlert>,
}

impl ConnectionManager {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_BUFFER);
        Self {
            clock,
            pools: DashMap::new(),
            index: DashMap::new(),
            inflight: Arc::new(Registry::new()),
            quality: DashMap::new(),
            strategies: DashMap::new(),
            endpoints: DashMap::new(),
            max_connections: DashMap::new(),
            paused: DashSet::new(),
            alerts,
        }
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn set_quality_config(&self, exchange: &ExchangeId, config: QualityConfig) {
        self.quality.insert(exchange.clone(), config);
    }

    pub fn quality_config(&self, exchange: &ExchangeId) -> QualityConfig {
        self.quality
            .get(exchange)
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    pub fn set_reconnection_strategy(&self, exchange: &ExchangeId, policy: ReconnectPolicy) {
        self.strategies.insert(exchange.clone(), policy);
    }

    pub fn reconnection_strategy(&self, exchange: &ExchangeId) -> ReconnectPolicy {
        self.strategies
            .get(exchange)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    pub fn set_endpoint(
        &self,
        exchange: &ExchangeId,
        transport: TransportType,
        endpoint: impl Into<String>,
    ) {
        self.endpoints
            .insert((exchange.clone(), transport), endpoint.into());
    }

    /// Registered endpoint, or `<scheme>://<exchange>`
    pub fn endpoint(&self, exchange: &ExchangeId, transport: TransportType) -> String {
        self.endpoints
            .get(&(exchange.clone(), transport))
            .map(|e| e.clone())
            .unwrap_or_else(|| format!("{}://{}", transport.scheme(), exchange))
    }

    /// Applies to pools created afterwards
    pub fn set_max_connections(&self, exchange: &ExchangeId, max: usize) {
        self.max_connections.insert(exchange.clone(), max.max(1));
    }

    fn max_connections_for(&self, exchange: &ExchangeId) -> usize {
        self.max_connections
            .get(exchange)
            .map(|m| *m)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<PoolAlert> {
        self.alerts.subscribe()
    }

    // ------------------------------------------------------------------
    // Acquisition
    // ------------------------------------------------------------------

    /// Reuse a CONNECTED connection of `transport`, or create one if the pool has room
    pub fn get_connection(
        &self,
        tenant: &TenantId,
        exchange: &ExchangeId,
        transport: TransportType,
    ) -> Result<Connection> {
        self.acquire(tenant, exchange, transport, true)
    }

    /// Always add a new connection (subject to capacity)
    pub fn create_connection(
        &self,
        tenant: &TenantId,
        exchange: &ExchangeId,
        transport: TransportType,
    ) -> Result<Connection> {
        self.acquire(tenant, exchange, transport, false)
    }

    fn acquire(
        &self,
        tenant: &TenantId,
        exchange: &ExchangeId,
        transport: TransportType,
        reuse: bool,
    ) -> Result<Connection> {
        let now = self.clock.now();
        let key = (tenant.clone(), exchange.clone());
        let mut pool = self.pools.entry(key.clone()).or_insert_with(|| {
            ConnectionPool::new(
                tenant.clone(),
                exchange.clone(),
                self.max_connections_for(exchange),
            )
        });

        if pool.shutting_down {
            return Err(PoolError::ShuttingDown {
                tenant: tenant.clone(),
                exchange: exchange.clone(),
            });
        }
        if reuse && let Some(existing) = pool.find_connected(transport) {
            return Ok(existing.snapshot(now));
        }
        if !pool.has_capacity() {
            warn!(
                "Connection pool {}/{} exhausted ({} connections)",
                tenant, exchange, pool.max_connections
            );
            return Err(PoolError::PoolExhausted {
                tenant: tenant.clone(),
                exchange: exchange.clone(),
                transport,
                max: pool.max_connections,
            });
        }

        let connection = Connection::new(
            tenant.clone(),
            exchange.clone(),
            transport,
            self.endpoint(exchange, transport),
            now,
        );
        info!(
            "Created {} connection {} for {}/{} -> {} ({}/{})",
            transport,
            connection.id,
            tenant,
            exchange,
            connection.endpoint,
            pool.connections.len() + 1,
            pool.max_connections
        );
        self.index.insert(connection.id, key);
        pool.connections.push(connection.clone());
        Ok(connection)
    }

    pub fn close_connection(&self, connection_id: ConnectionId) -> Result<()> {
        let (_, key) = self
            .index
            .remove(&connection_id)
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        if let Some(mut pool) = self.pools.get_mut(&key) {
            pool.connections.retain(|c| c.id != connection_id);
        }
        info!("Closed connection {} ({}/{})", connection_id, key.0, key.1);
        Ok(())
    }

    /// Snapshot of one pool
    pub fn get_connection_pool(
        &self,
        tenant: &TenantId,
        exchange: &ExchangeId,
    ) -> Option<ConnectionPool> {
        let now = self.clock.now();
        self.pools
            .get(&(tenant.clone(), exchange.clone()))
            .map(|pool| {
                let mut copy = pool.clone();
                copy.connections = pool.connections.iter().map(|c| c.snapshot(now)).collect();
                copy
            })
    }

    pub fn get_connection_metrics(&self, connection_id: ConnectionId) -> Result<ConnectionMetrics> {
        let now = self.clock.now();
        self.with_connection(connection_id, |conn| conn.snapshot(now).metrics)
    }

    pub fn has_pool(&self, tenant: &TenantId, exchange: &ExchangeId) -> bool {
        self.pools.contains_key(&(tenant.clone(), exchange.clone()))
    }

    /// Ids of every tenant's connections to `exchange` over `transport`
    pub fn connections_for(&self, exchange: &ExchangeId, transport: TransportType) -> Vec<ConnectionId> {
        self.pools
            .iter()
            .filter(|entry| &entry.key().1 == exchange)
            .flat_map(|entry| {
                entry
                    .connections
                    .iter()
                    .filter(|c| c.transport == transport)
                    .map(|c| c.id)
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn with_connection<R>(
        &self,
        connection_id: ConnectionId,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Result<R> {
        let key = self
            .index
            .get(&connection_id)
            .map(|k| k.clone())
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        let mut pool = self
            .pools
            .get_mut(&key)
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        let connection = pool
            .get_mut(&connection_id)
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        Ok(f(connection))
    }

    // ------------------------------------------------------------------
    // Metrics feedback
    // ------------------------------------------------------------------

    pub fn record_success(&self, connection_id: ConnectionId, latency_ms: f64) -> Result<()> {
        let now = self.clock.now();
        let (exchange, tenant) = self.with_connection(connection_id, |conn| {
            conn.metrics.record_success(latency_ms);
            conn.last_activity_at = now;
            (conn.exchange.clone(), conn.tenant.clone())
        })?;

        let quality = self.quality_config(&exchange);
        if latency_ms > quality.max_latency_ms {
            warn!(
                "High latency on {} ({}/{}): {:.0}ms > {:.0}ms",
                connection_id, tenant, exchange, latency_ms, quality.max_latency_ms
            );
            self.alert(PoolAlert {
                kind: AlertKind::HighLatency,
                tenant,
                exchange,
                connection_id: Some(connection_id),
                value: latency_ms,
                threshold: quality.max_latency_ms,
                message: format!("latency {:.0}ms", latency_ms),
                timestamp: now,
            });
        }
        Ok(())
    }

    pub fn record_error(&self, connection_id: ConnectionId, error: &str) -> Result<()> {
        let now = self.clock.now();
        let (exchange, tenant, error_rate) = self.with_connection(connection_id, |conn| {
            conn.metrics.record_error(error, now);
            conn.last_activity_at = now;
            (conn.exchange.clone(), conn.tenant.clone(), conn.metrics.error_rate)
        })?;
        debug!("Error on {}: {} (rate {:.2})", connection_id, error, error_rate);

        let quality = self.quality_config(&exchange);
        if error_rate > quality.max_error_rate {
            warn!(
                "High error rate on {} ({}/{}): {:.2} > {:.2}",
                connection_id, tenant, exchange, error_rate, quality.max_error_rate
            );
            self.alert(PoolAlert {
                kind: AlertKind::HighErrorRate,
                tenant,
                exchange,
                connection_id: Some(connection_id),
                value: error_rate,
                threshold: quality.max_error_rate,
                message: error.to_string(),
                timestamp: now,
            });
        }
        Ok(())
    }

    pub fn record_message_sent(&self, connection_id: ConnectionId) -> Result<()> {
        let now = self.clock.now();
        self.with_connection(connection_id, |conn| {
            conn.metrics.messages_sent += 1;
            conn.last_activity_at = now;
        })
    }

    pub fn record_message_received(&self, connection_id: ConnectionId) -> Result<()> {
        let now = self.clock.now();
        self.with_connection(connection_id, |conn| {
            conn.metrics.messages_received += 1;
            conn.last_activity_at = now;
        })
    }

    // ------------------------------------------------------------------
    // Reconnection bookkeeping
    // ------------------------------------------------------------------

    /// Count a reconnect attempt; returns the connection's attempt counter
    pub fn record_reconnection(&self, connection_id: ConnectionId) -> Result<u32> {
        self.with_connection(connection_id, |conn| {
            conn.reconnect_attempts += 1;
            conn.metrics.reconnection_count += 1;
            conn.status = ConnectionStatus::Reconnecting;
            info!(
                "Connection {} reconnecting (attempt {})",
                connection_id, conn.reconnect_attempts
            );
            conn.reconnect_attempts
        })
    }

    pub fn mark_reconnected(&self, connection_id: ConnectionId) -> Result<()> {
        let now = self.clock.now();
        self.with_connection(connection_id, |conn| {
            conn.status = ConnectionStatus::Connected;
            conn.connected_at = now;
            conn.last_activity_at = now;
            conn.reconnect_attempts = 0;
            info!("Connection {} reconnected", connection_id);
        })
    }

    pub fn mark_disconnected(&self, connection_id: ConnectionId, reason: &str) -> Result<()> {
        let now = self.clock.now();
        let (exchange, tenant) = self.with_connection(connection_id, |conn| {
            conn.status = ConnectionStatus::Disconnected;
            conn.metrics.last_error = Some(reason.to_string());
            conn.metrics.last_error_at = Some(now);
            (conn.exchange.clone(), conn.tenant.clone())
        })?;
        warn!("Connection {} lost ({}/{}): {}", connection_id, tenant, exchange, reason);
        self.alert(PoolAlert {
            kind: AlertKind::ConnectionLost,
            tenant,
            exchange,
            connection_id: Some(connection_id),
            value: 0.0,
            threshold: 0.0,
            message: reason.to_string(),
            timestamp: now,
        });
        Ok(())
    }

    /// Backoff before the connection's next attempt, or `None` when exhausted
    pub fn next_reconnect_delay(&self, connection_id: ConnectionId) -> Result<Option<Duration>> {
        let (exchange, attempts) = self.with_connection(connection_id, |conn| {
            (conn.exchange.clone(), conn.reconnect_attempts)
        })?;
        let policy = self.reconnection_strategy(&exchange);
        if !policy.allows_attempt(attempts) {
            return Ok(None);
        }
        Ok(Some(backoff_delay(&policy, attempts)))
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Classify a pool and pause trading on degradation when configured
    pub fn monitor_health(&self, tenant: &TenantId, exchange: &ExchangeId) -> HealthReport {
        let now = self.clock.now();
        let quality = self.quality_config(exchange);
        let key = (tenant.clone(), exchange.clone());

        let (healthy, total) = self
            .pools
            .get(&key)
            .map(|pool| {
                let healthy = pool
                    .connections
                    .iter()
                    .filter(|c| quality.is_healthy(c))
                    .count();
                (healthy, pool.connections.len())
            })
            .unwrap_or((0, 0));
        let level = HealthLevel::classify(healthy, total);

        if level != HealthLevel::Healthy
            && quality.pause_trading_on_degradation
            && self.paused.insert(key.clone())
        {
            warn!(
                "Trading paused for {}/{}: health {} ({}/{} healthy)",
                tenant, exchange, level, healthy, total
            );
            self.alert(PoolAlert {
                kind: AlertKind::TradingPaused,
                tenant: tenant.clone(),
                exchange: exchange.clone(),
                connection_id: None,
                value: healthy as f64,
                threshold: total as f64,
                message: format!("health {}", level),
                timestamp: now,
            });
        }

        HealthReport {
            tenant: tenant.clone(),
            exchange: exchange.clone(),
            level,
            healthy_connections: healthy,
            total_connections: total,
            trading_paused: self.paused.contains(&key),
            checked_at: now,
        }
    }

    pub fn is_trading_paused(&self, tenant: &TenantId, exchange: &ExchangeId) -> bool {
        self.paused.contains(&(tenant.clone(), exchange.clone()))
    }

    /// Returns whether trading had been paused
    pub fn resume_trading(&self, tenant: &TenantId, exchange: &ExchangeId) -> bool {
        let resumed = self
            .paused
            .remove(&(tenant.clone(), exchange.clone()))
            .is_some();
        if resumed {
            info!("Trading resumed for {}/{}", tenant, exchange);
        }
        resumed
    }

    fn alert(&self, alert: PoolAlert) {
        // No subscribers is fine
        let _ = self.alerts.send(alert);
    }

    // ------------------------------------------------------------------
    // In-flight requests and shutdown
    // ------------------------------------------------------------------

    /// Register a request running on `connection_id` so shutdown waits for it
    pub fn track_request(&self, connection_id: ConnectionId) -> Result<RequestHandle> {
        let key = self
            .index
            .get(&connection_id)
            .map(|k| k.clone())
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        // Registration happens under the pool entry lock; graceful_shutdown
        // raises the flag under the same lock before it snapshots in-flight
        let pool = self
            .pools
            .get(&key)
            .ok_or(PoolError::ConnectionNotFound(connection_id))?;
        if pool.shutting_down {
            return Err(PoolError::ShuttingDown {
                tenant: key.0,
                exchange: key.1,
            });
        }
        let handle = RequestHandle::register(&self.inflight, connection_id, key, self.clock.now());
        drop(pool);
        Ok(handle)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.len()
    }

    /// Drain and close the tenant's pools (one exchange, or all when `None`)
    ///
    /// New acquisitions fail immediately once this starts. In-flight requests
    /// get until `timeout` to finish; stragglers are cancelled. Connections are
    /// closed and the pools removed only after the drain.
    pub async fn graceful_shutdown(
        &self,
        tenant: &TenantId,
        exchange: Option<&ExchangeId>,
        timeout: Duration,
    ) -> ShutdownReport {
        let started = Instant::now();
        let deadline = started + timeout;

        let keys: Vec<PoolKey> = self
            .pools
            .iter()
            .filter(|entry| {
                let (t, ex) = entry.key();
                t == tenant && exchange.is_none_or(|e| e == ex)
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in &keys {
            if let Some(mut pool) = self.pools.get_mut(key) {
                pool.shutting_down = true;
            }
        }

        let ids: Vec<_> = self
            .inflight
            .iter()
            .filter(|entry| keys.contains(&entry.pool))
            .map(|entry| *entry.key())
            .collect();
        let pending: Vec<_> = ids
            .iter()
            .filter_map(|id| self.inflight.remove(id))
            .collect();

        info!(
            "Shutting down {} pool(s) for {}: draining {} in-flight request(s), timeout {:?}",
            keys.len(),
            tenant,
            pending.len(),
            timeout
        );

        let now = self.clock.now();
        let drains = pending.into_iter().map(|(id, entry)| async move {
            match timeout_at(deadline, entry.done).await {
                Ok(Ok(RequestOutcome::Completed)) => Drained::Completed,
                Ok(Ok(RequestOutcome::Failed(reason))) => {
                    debug!("In-flight {} failed during drain: {}", id, reason);
                    Drained::Failed
                }
                Ok(Err(_)) => Drained::Failed,
                Err(_) => {
                    warn!(
                        "Cancelling {} on {} (in flight for {}ms)",
                        id,
                        entry.connection_id,
                        age_ms(entry.started_at, now)
                    );
                    Drained::Cancelled
                }
            }
        });
        let results = join_all(drains).await;

        let mut report = ShutdownReport {
            pools_closed: 0,
            connections_closed: 0,
            requests_completed: 0,
            requests_failed: 0,
            requests_cancelled: 0,
            elapsed_ms: 0,
        };
        for result in results {
            match result {
                Drained::Completed => report.requests_completed += 1,
                Drained::Failed => report.requests_failed += 1,
                Drained::Cancelled => report.requests_cancelled += 1,
            }
        }

        for key in &keys {
            if let Some((_, pool)) = self.pools.remove(key) {
                for connection in &pool.connections {
                    self.index.remove(&connection.id);
                }
                report.connections_closed += pool.connections.len();
                report.pools_closed += 1;
            }
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            "Shutdown for {} complete: {} connection(s) closed, {} completed, {} failed, {} cancelled in {}ms",
            tenant,
            report.connections_closed,
            report.requests_completed,
            report.requests_failed,
            report.requests_cancelled,
            report.elapsed_ms
        );
        report
    }

    /// Drop every pool without draining; settings are kept
    pub fn clear(&self) {
        self.pools.clear();
        self.index.clear();
        self.inflight.clear();
        self.paused.clear();
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock::new()))
    }
}

fn age_ms(started_at: Timestamp, now: Timestamp) -> i64 {
    (now - started_at).num_milliseconds().max(0)
}
