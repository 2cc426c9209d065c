use thiserror::Error;

/// Byte-stream errors reported by a `StreamConnector` or `ByteSink`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Stream closed")]
    Closed,
}

pub type StreamResult<T> = std::result::Result<T, StreamError>;
