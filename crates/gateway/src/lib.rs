//! Conduit Gateway
//!
//! Wiring for the exchange connectivity core. Provides:
//! - JSON configuration loading ([`config`])
//! - A TCP implementation of the byte-stream port ([`transport`])
//! - [`ConnectivityCore`], which routes outbound orders through the rate
//!   governor, the connection pool and the FIX session for an exchange
//!
//! ## Architecture
//!
//! ```text
//!            caller
//!              │ send_fix_order(tenant, exchange, priority, msg)
//!     ┌────────▼─────────┐
//!     │ ConnectivityCore │
//!     └──┬──────┬─────┬──┘
//!        │      │     │
//!  RateGovernor │  FixClient ── TcpConnector ── exchange
//!               │
//!      ConnectionManager
//! ```

pub mod config;
mod connectivity;
pub mod error;
pub mod transport;

pub use config::{
    ConfigError, ConnectivityConfig, ExchangeConfig, GlobalConfig, load_config,
    load_config_from_str, load_default_config,
};
pub use connectivity::{ConnectivityCore, OrderDispatch, OrderReceipt};
pub use error::{GatewayError, Result};
pub use transport::TcpConnector;
