//! Stream transports
//!
//! Implementations of the `StreamConnector` port. Sessions only see the port,
//! so tests swap in an in-memory connector.

pub mod tcp;

pub use tcp::TcpConnector;
