//! Connection pool and health monitor
//!
//! Bounded per-tenant, per-exchange pools of logical connections. Each
//! connection carries latency and error-rate metrics that feed a health
//! classification; degraded pools can pause trading and every threshold
//! crossing is published as a [`PoolAlert`].
//!
//! Shutdown is graceful: new acquisitions are refused, requests tracked with
//! [`ConnectionManager::track_request`] are given a deadline to finish, and
//! only then are the connections closed.

mod connection;
mod error;
mod health;
mod inflight;
mod manager;

pub use connection::{Connection, ConnectionMetrics, ConnectionPool, ConnectionStatus};
pub use error::{PoolError, Result};
pub use health::{AlertKind, HealthLevel, HealthReport, PoolAlert, QualityConfig};
pub use inflight::RequestHandle;
pub use manager::{ConnectionManager, DEFAULT_MAX_CONNECTIONS, ShutdownReport};
