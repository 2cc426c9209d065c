//! Connectivity facade
//!
//! Wires the three subsystems together in the order every outbound operation
//! goes through them:
//!
//! ```text
//! send_fix_order
//!     │
//!     ├─ trading paused? ───────────────► TradingPaused (unless CRITICAL)
//!     ├─ RateGovernor::try_acquire(ORDERS)
//!     │      └─ denied ──► queued; dispatched when the window allows
//!     ├─ ConnectionManager::get_connection(FIX) + track_request
//!     ├─ FixClient::send_message
//!     └─ record latency / error on the pooled connection
//! ```

use conduit_clock::SystemClock;
use conduit_core::{ConnectionId, ExchangeId, RequestId, TenantId, TransportType};
use conduit_fix::{FixClient, FixError, FixEvent, FixMessage, SessionStatus};
use conduit_pool::{ConnectionManager, ShutdownReport};
use conduit_ports::{Clock, StreamConnector};
use conduit_rate_governor::{Admission, Priority, RateCategory, RateGovernor};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::config::ConnectivityConfig;
use crate::error::{GatewayError, Result};
use crate::transport::TcpConnector;

/// Outcome of a sent order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub exchange: ExchangeId,
    pub connection_id: ConnectionId,
    /// MsgSeqNum the order went out with
    pub seq_num: u64,
    pub latency_ms: f64,
}

/// Result of [`ConnectivityCore::send_fix_order`]
#[derive(Debug)]
pub enum OrderDispatch {
    Sent(OrderReceipt),
    /// Rate limited; the order goes out once the governor admits it
    Queued {
        request_id: RequestId,
        wait_ms: u64,
        receipt: oneshot::Receiver<Result<OrderReceipt>>,
    },
}

impl OrderDispatch {
    pub fn is_sent(&self) -> bool {
        matches!(self, OrderDispatch::Sent(_))
    }

    /// Resolve to the receipt, waiting for a queued order to go out
    pub async fn wait(self) -> Result<OrderReceipt> {
        match self {
            OrderDispatch::Sent(receipt) => Ok(receipt),
            OrderDispatch::Queued { receipt, .. } => {
                receipt.await.map_err(|_| GatewayError::Dropped)?
            }
        }
    }
}

/// Everything needed to put one order on the wire after admission
#[derive(Clone)]
struct Dispatcher {
    pool: Arc<ConnectionManager>,
    session: FixClient,
    exchange: ExchangeId,
}

impl Dispatcher {
    async fn dispatch(&self, tenant: &TenantId, message: FixMessage) -> Result<OrderReceipt> {
        let connection = self
            .pool
            .get_connection(tenant, &self.exchange, TransportType::Fix)?;
        let request = self.pool.track_request(connection.id)?;

        let started = Instant::now();
        match self.session.send_message(message).await {
            Ok(seq_num) => {
                let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
                self.pool.record_success(connection.id, latency_ms)?;
                self.pool.record_message_sent(connection.id)?;
                if let Err(e) = request.complete() {
                    warn!("Order {} on {} finished after shutdown: {}", seq_num, self.exchange, e);
                }
                debug!(
                    "Order sent on {} seq {} in {:.2}ms",
                    self.exchange, seq_num, latency_ms
                );
                Ok(OrderReceipt {
                    exchange: self.exchange.clone(),
                    connection_id: connection.id,
                    seq_num,
                    latency_ms,
                })
            }
            Err(e) => {
                warn!("Order on {} failed: {}", self.exchange, e);
                self.pool.record_error(connection.id, &e.to_string())?;
                let _ = request.fail(e.to_string());
                Err(e.into())
            }
        }
    }
}

/// Owns the rate governor, the connection manager and one FIX session per
/// FIX-enabled exchange
pub struct ConnectivityCore {
    governor: Arc<RateGovernor>,
    pool: Arc<ConnectionManager>,
    sessions: HashMap<ExchangeId, FixClient>,
    exchanges: Vec<ExchangeId>,
    runtime: Handle,
}

impl ConnectivityCore {
    /// Configure every enabled exchange and spawn its FIX session (DISCONNECTED)
    pub fn new(
        config: &ConnectivityConfig,
        connector: Arc<dyn StreamConnector>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| GatewayError::NoRuntime)?;

        let governor = Arc::new(RateGovernor::new(Arc::clone(&clock)));
        let pool = Arc::new(ConnectionManager::new(Arc::clone(&clock)));
        let mut sessions = HashMap::new();
        let mut exchanges = Vec::new();

        for exchange_config in config.enabled_exchanges() {
            let exchange = exchange_config.exchange_id();
            governor.configure(&exchange, exchange_config.rate_limits.clone());
            pool.set_quality_config(&exchange, exchange_config.quality.clone());
            pool.set_reconnection_strategy(&exchange, exchange_config.reconnection.clone());
            pool.set_max_connections(&exchange, exchange_config.max_connections);
            for transport in [TransportType::Rest, TransportType::WebSocket, TransportType::Fix] {
                if let Some(endpoint) = exchange_config.endpoint(transport) {
                    pool.set_endpoint(&exchange, transport, endpoint);
                }
            }

            if let Some(fix) = &exchange_config.fix {
                let client = FixClient::spawn(fix.clone(), Arc::clone(&connector), Arc::clone(&clock));
                runtime.spawn(watch_session(
                    Arc::clone(&pool),
                    exchange.clone(),
                    client.subscribe(),
                ));
                info!("FIX session {} ready for {}", client.session_id(), exchange);
                sessions.insert(exchange.clone(), client);
            }
            exchanges.push(exchange);
        }

        info!(
            "Connectivity core configured: {} exchange(s), {} FIX session(s)",
            exchanges.len(),
            sessions.len()
        );
        Ok(Self {
            governor,
            pool,
            sessions,
            exchanges,
            runtime,
        })
    }

    /// Production wiring: TCP streams and the system clock
    pub fn from_config(config: &ConnectivityConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(TcpConnector::new()),
            Arc::new(SystemClock::new()),
        )
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    pub fn pool(&self) -> &Arc<ConnectionManager> {
        &self.pool
    }

    pub fn session(&self, exchange: &ExchangeId) -> Option<&FixClient> {
        self.sessions.get(exchange)
    }

    pub fn exchanges(&self) -> &[ExchangeId] {
        &self.exchanges
    }

    /// Connect and log on every FIX session; failures are returned per exchange
    pub async fn logon_all(&self) -> Vec<(ExchangeId, FixError)> {
        let mut failures = Vec::new();
        for (exchange, session) in &self.sessions {
            let outcome = async {
                session.connect().await?;
                session.logon().await
            }
            .await;
            match outcome {
                Ok(()) => info!("Logged on to {}", exchange),
                Err(e) => {
                    error!("Logon to {} failed: {}", exchange, e);
                    failures.push((exchange.clone(), e));
                }
            }
        }
        failures
    }

    /// Send an application message through admission, pool and session
    ///
    /// While trading is paused for the tenant/exchange only `Critical`
    /// messages (cancels) go through.
    pub async fn send_fix_order(
        &self,
        tenant: &TenantId,
        exchange: &ExchangeId,
        priority: Priority,
        message: FixMessage,
    ) -> Result<OrderDispatch> {
        let session = self
            .sessions
            .get(exchange)
            .ok_or_else(|| GatewayError::NoFixSession(exchange.clone()))?;
        if priority != Priority::Critical && self.pool.is_trading_paused(tenant, exchange) {
            return Err(GatewayError::TradingPaused {
                tenant: tenant.clone(),
                exchange: exchange.clone(),
            });
        }

        let dispatcher = Dispatcher {
            pool: Arc::clone(&self.pool),
            session: session.clone(),
            exchange: exchange.clone(),
        };
        let admission = Admission::new(tenant.clone(), RateCategory::Orders, priority);
        let check = self.governor.try_acquire(exchange, &admission);
        if check.allowed {
            return Ok(OrderDispatch::Sent(dispatcher.dispatch(tenant, message).await?));
        }

        let (tx, rx) = oneshot::channel();
        let runtime = self.runtime.clone();
        let owner = tenant.clone();
        let request_id = self.governor.queue_request(exchange, admission, move || {
            runtime.spawn(async move {
                let _ = tx.send(dispatcher.dispatch(&owner, message).await);
            });
        });
        self.schedule_queue_pass(exchange, check.wait_ms);
        info!(
            "Order for {}/{} queued as {} ({}), retry in {}ms",
            tenant, exchange, request_id, priority, check.wait_ms
        );
        Ok(OrderDispatch::Queued {
            request_id,
            wait_ms: check.wait_ms,
            receipt: rx,
        })
    }

    fn schedule_queue_pass(&self, exchange: &ExchangeId, wait_ms: u64) {
        let governor = Arc::clone(&self.governor);
        let exchange = exchange.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(wait_ms.max(1))).await;
            governor.process_queue(&exchange);
        });
    }

    /// Release admitted queued requests and check pool health for `tenant`
    ///
    /// Exchanges the tenant has not used yet have no pool and are skipped.
    pub fn run_maintenance(&self, tenant: &TenantId) {
        for exchange in &self.exchanges {
            self.governor.process_queue(exchange);
            if !self.pool.has_pool(tenant, exchange) {
                continue;
            }
            let report = self.pool.monitor_health(tenant, exchange);
            debug!(
                "{}/{} health {} ({}/{} healthy)",
                tenant, exchange, report.level, report.healthy_connections, report.total_connections
            );
        }
    }

    /// Run [`run_maintenance`](Self::run_maintenance) every `period`
    pub fn spawn_maintenance(self: &Arc<Self>, tenant: TenantId, period: Duration) -> JoinHandle<()> {
        let core = Arc::clone(self);
        self.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                core.run_maintenance(&tenant);
            }
        })
    }

    /// Drain the tenant's pools, then log out and disconnect every FIX session
    pub async fn shutdown(&self, tenant: &TenantId, timeout: Duration) -> ShutdownReport {
        let report = self.pool.graceful_shutdown(tenant, None, timeout).await;

        for (exchange, session) in &self.sessions {
            let status = match session.session_state().await {
                Ok(state) => state.status,
                Err(_) => continue,
            };
            if status == SessionStatus::Disconnected {
                continue;
            }
            if let Err(e) = session.disconnect().await {
                warn!("Disconnect from {} failed: {}", exchange, e);
            }
        }
        info!("Connectivity core for {} shut down", tenant);
        report
    }
}

/// Mirror a FIX session's lifecycle onto every pooled FIX connection to its
/// exchange, so health checks and alerts see the real link state
async fn watch_session(
    pool: Arc<ConnectionManager>,
    exchange: ExchangeId,
    mut events: broadcast::Receiver<FixEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Session watcher for {} skipped {} event(s)", exchange, skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if !matches!(
            event,
            FixEvent::Disconnected
                | FixEvent::Reconnecting { .. }
                | FixEvent::Reconnected
                | FixEvent::ReconnectFailed { .. }
        ) {
            continue;
        }

        for connection_id in pool.connections_for(&exchange, TransportType::Fix) {
            let outcome = match &event {
                FixEvent::Disconnected => {
                    pool.mark_disconnected(connection_id, "FIX session disconnected")
                }
                FixEvent::ReconnectFailed { attempts } => pool.mark_disconnected(
                    connection_id,
                    &format!("FIX reconnection failed after {} attempts", attempts),
                ),
                FixEvent::Reconnecting { .. } => pool.record_reconnection(connection_id).map(|_| ()),
                _ => pool.mark_reconnected(connection_id),
            };
            // The pool may have been shut down under us
            if let Err(e) = outcome {
                debug!("{} on {}: {}", event.name(), connection_id, e);
            }
        }
    }
    debug!("Session watcher for {} stopped", exchange);
}

impl std::fmt::Debug for ConnectivityCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityCore")
            .field("exchanges", &self.exchanges)
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .finish()
    }
}
