use crate::error::StreamResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound notification from an open byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Bytes received from the peer (arbitrary chunking)
    Data(Vec<u8>),
    /// Peer closed the stream
    Closed,
    /// Stream failed; no further events follow
    Error(String),
}

/// Write half of an open byte stream
#[async_trait]
pub trait ByteSink: Send {
    /// Write all bytes to the stream
    async fn write(&mut self, bytes: &[u8]) -> StreamResult<()>;

    /// Close the stream. Closing twice is a no-op.
    async fn close(&mut self);
}

/// An open stream: the write half plus the receive channel
pub struct StreamHandle {
    pub sink: Box<dyn ByteSink>,
    pub events: mpsc::Receiver<StreamEvent>,
}

/// Opens byte streams to a host/port (TCP in production, in-memory in tests)
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> StreamResult<StreamHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_sink_object_safe(_: &mut dyn ByteSink) {}
    fn _assert_connector_object_safe(_: &dyn StreamConnector) {}
}
