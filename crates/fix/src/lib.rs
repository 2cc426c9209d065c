//! FIX session engine
//!
//! Client side of a FIX 4.2/4.4 session over any [`StreamConnector`]:
//!
//! - [`codec`] - tag=value framing, BodyLength and CheckSum, stream reassembly
//! - [`FixMessage`] - structured messages and builders
//! - [`FixClient`] - handle to a per-session task that owns sequence numbers,
//!   heartbeats, test requests, gap handling and reconnection
//! - [`MessageLog`] - bounded log of every frame sent and received
//!
//! [`StreamConnector`]: conduit_ports::StreamConnector

pub mod codec;
pub mod message_log;
pub mod tags;

mod client;
mod engine;
mod error;
mod events;
mod message;
mod session;

pub use client::FixClient;
pub use error::{FixError, Result};
pub use events::FixEvent;
pub use message_log::{Direction, LogQuery, MessageLog, MessageLogEntry};
pub use message::{FixMessage, FixValue};
pub use session::{SessionConfig, SessionState, SessionStatus};
pub use tags::{FixVersion, MsgType};
