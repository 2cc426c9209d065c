//! Error types for the gateway crate

use conduit_core::{ExchangeId, TenantId};
use conduit_fix::FixError;
use conduit_pool::PoolError;
use conduit_rate_governor::RateGovernorError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors from the connectivity facade
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("FIX session error: {0}")]
    Fix(#[from] FixError),

    #[error("Connection pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Rate governor error: {0}")]
    RateGovernor(#[from] RateGovernorError),

    #[error("No FIX session configured for exchange {0}")]
    NoFixSession(ExchangeId),

    #[error("Trading is paused for {tenant}/{exchange}")]
    TradingPaused {
        tenant: TenantId,
        exchange: ExchangeId,
    },

    #[error("Must be started inside a tokio runtime")]
    NoRuntime,

    /// A queued order was dropped before it ran (cancelled or governor cleared)
    #[error("Queued order was dropped before dispatch")]
    Dropped,
}

pub type Result<T> = std::result::Result<T, GatewayError>;
