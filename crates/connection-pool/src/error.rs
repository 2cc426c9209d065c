use conduit_core::{ConnectionId, ExchangeId, RequestId, TenantId, TransportType};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("Connection pool for {tenant}/{exchange} exhausted ({max} connections, none {transport})")]
    PoolExhausted {
        tenant: TenantId,
        exchange: ExchangeId,
        transport: TransportType,
        max: usize,
    },

    #[error("Connection pool for {tenant}/{exchange} is shutting down")]
    ShuttingDown {
        tenant: TenantId,
        exchange: ExchangeId,
    },

    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// The request outlived a graceful shutdown drain
    #[error("Request {0} was cancelled by shutdown")]
    RequestCancelled(RequestId),
}

pub type Result<T> = std::result::Result<T, PoolError>;
