//! Conduit Core Domain
//!
//! Plain domain types shared by the exchange connectivity subsystems
//! (FIX session engine, rate governor, connection pool).
//! This crate contains no async and no I/O.

pub mod ids;
pub mod reconnect;
pub mod transport;

pub use ids::{ConnectionId, ExchangeId, RequestId, TenantId};
pub use reconnect::{ReconnectPolicy, backoff_delay, backoff_delay_with};
pub use transport::TransportType;

use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;
