//! TCP byte streams for FIX sessions
//!
//! Each connection is split: the write half backs the [`ByteSink`] handed to
//! the session, and a spawned read task forwards everything it reads as
//! [`StreamEvent`]s until the peer closes, the read fails, or the session
//! drops its receiver.

use async_trait::async_trait;
use conduit_ports::{ByteSink, StreamConnector, StreamError, StreamEvent, StreamHandle, StreamResult};
use log::{debug, warn};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;

const READ_BUFFER: usize = 8 * 1024;
const EVENT_BUFFER: usize = 1_024;

/// [`StreamConnector`] over `tokio::net::TcpStream`
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamConnector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> StreamResult<StreamHandle> {
        let endpoint = format!("{}:{}", host, port);
        let stream = match timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(StreamError::Connect {
                    endpoint,
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(StreamError::Connect {
                    endpoint,
                    reason: format!("timed out after {:?}", self.connect_timeout),
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Could not disable Nagle on {}: {}", endpoint, e);
        }
        debug!("TCP connected to {}", endpoint);

        let (read, write) = stream.into_split();
        let (events_tx, events) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(read_loop(read, events_tx, endpoint.clone()));

        Ok(StreamHandle {
            sink: Box::new(TcpSink {
                write: Some(write),
                endpoint,
            }),
            events,
        })
    }
}

async fn read_loop(mut read: OwnedReadHalf, events: mpsc::Sender<StreamEvent>, endpoint: String) {
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        match read.read(&mut buf).await {
            Ok(0) => {
                debug!("{} closed the connection", endpoint);
                let _ = events.send(StreamEvent::Closed).await;
                break;
            }
            Ok(n) => {
                if events.send(StreamEvent::Data(buf[..n].to_vec())).await.is_err() {
                    // Session is gone
                    break;
                }
            }
            Err(e) => {
                warn!("Read from {} failed: {}", endpoint, e);
                let _ = events.send(StreamEvent::Error(e.to_string())).await;
                break;
            }
        }
    }
}

struct TcpSink {
    write: Option<OwnedWriteHalf>,
    endpoint: String,
}

#[async_trait]
impl ByteSink for TcpSink {
    async fn write(&mut self, bytes: &[u8]) -> StreamResult<()> {
        let write = self.write.as_mut().ok_or(StreamError::Closed)?;
        write
            .write_all(bytes)
            .await
            .map_err(|e| StreamError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut write) = self.write.take() {
            if let Err(e) = write.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.endpoint, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_round_trip_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"pong").await.unwrap();
            buf
        });

        let mut handle = TcpConnector::new().connect("127.0.0.1", port).await.unwrap();
        handle.sink.write(b"ping!").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"ping!");

        let mut received = Vec::new();
        loop {
            match handle.events.recv().await.unwrap() {
                StreamEvent::Data(bytes) => received.extend(bytes),
                StreamEvent::Closed => break,
                StreamEvent::Error(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(received, b"pong");

        handle.sink.close().await;
        handle.sink.close().await;
        assert_eq!(handle.sink.write(b"x").await, Err(StreamError::Closed));
    }

    #[tokio::test]
    async fn test_refused_connection() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = TcpConnector::new()
            .connect("127.0.0.1", port)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, StreamError::Connect { endpoint, .. } if endpoint == format!("127.0.0.1:{}", port)));
    }
}
