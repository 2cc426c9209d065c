//! FIX session errors

use conduit_ports::StreamError;
use thiserror::Error;

use crate::session::SessionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FixError {
    /// Malformed frame or unknown message type
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: u8, computed: u8 },

    #[error("Operation not allowed in state {0}")]
    InvalidState(SessionStatus),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is not logged on")]
    NotLoggedOn,

    #[error("Logon rejected: {0}")]
    LogonRejected(String),

    #[error("Logon timed out after {0}s")]
    LogonTimeout(u64),

    #[error("Transport error: {0}")]
    Transport(#[from] StreamError),

    /// The session task stopped or the stream went away mid-operation
    #[error("Session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, FixError>;
