//! In-memory exchange side of a FIX session

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use conduit_fix::codec::{self, Header};
use conduit_fix::{FixClient, FixEvent, FixMessage, FixVersion, MsgType, SessionConfig};
use conduit_ports::{ByteSink, StreamConnector, StreamError, StreamEvent, StreamHandle, StreamResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(60);

/// Hands every accepted connection to the test as a [`Peer`]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<Peer>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, rx)
    }

    /// Make subsequent connects fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for MemoryConnector {
    async fn connect(&self, host: &str, port: u16) -> StreamResult<StreamHandle> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(StreamError::Connect {
                endpoint: format!("{}:{}", host, port),
                reason: "connection refused".into(),
            });
        }

        let (to_peer, from_client) = mpsc::unbounded_channel();
        let (to_client, events) = mpsc::channel(1_024);
        let peer = Peer {
            from_client,
            to_client,
            next_seq: 1,
        };
        self.peers
            .send(peer)
            .map_err(|_| StreamError::Connect {
                endpoint: format!("{}:{}", host, port),
                reason: "test dropped the listener".into(),
            })?;

        Ok(StreamHandle {
            sink: Box::new(MemorySink {
                tx: Some(to_peer),
            }),
            events,
        })
    }
}

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl ByteSink for MemorySink {
    async fn write(&mut self, bytes: &[u8]) -> StreamResult<()> {
        let tx = self.tx.as_ref().ok_or(StreamError::Closed)?;
        tx.send(bytes.to_vec()).map_err(|_| StreamError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Exchange end of one connection
pub struct Peer {
    from_client: mpsc::UnboundedReceiver<Vec<u8>>,
    to_client: mpsc::Sender<StreamEvent>,
    pub next_seq: u64,
}

impl Peer {
    /// Next frame written by the client
    pub async fn recv(&mut self) -> FixMessage {
        let bytes = timeout(RECV_TIMEOUT, self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the stream");
        let raw = String::from_utf8(bytes).expect("frame is not utf-8");
        codec::verify_checksum(&raw).expect("client sent a bad checksum");
        FixClient::parse_message(&raw).expect("client sent an undecodable frame")
    }

    pub async fn expect(&mut self, msg_type: MsgType) -> FixMessage {
        let msg = self.recv().await;
        assert_eq!(msg.msg_type(), msg_type, "unexpected frame: {:?}", msg);
        msg
    }

    /// Whether a frame is already waiting
    pub fn has_pending(&mut self) -> bool {
        !self.from_client.is_empty()
    }

    /// Send with the peer's next sequence number
    pub async fn send(&mut self, msg: &FixMessage) {
        let seq = self.next_seq;
        self.send_with_seq(msg, seq).await;
        self.next_seq = seq + 1;
    }

    /// Send with an explicit sequence number, leaving `next_seq` alone
    pub async fn send_with_seq(&mut self, msg: &FixMessage, seq: u64) {
        let raw = codec::encode(
            msg,
            &Header {
                version: FixVersion::Fix44,
                sender_comp_id: "EXCHANGE",
                target_comp_id: "CLIENT",
                seq_num: seq,
                sending_time: Utc::now(),
            },
        );
        self.send_raw(raw.into_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: Vec<u8>) {
        self.to_client
            .send(StreamEvent::Data(bytes))
            .await
            .expect("client stopped reading");
    }

    pub async fn close(&mut self) {
        let _ = self.to_client.send(StreamEvent::Closed).await;
    }
}

pub fn config() -> SessionConfig {
    SessionConfig::new("CLIENT", "EXCHANGE", "fix.test", 9878)
}

/// Connect and complete the logon handshake
pub async fn logged_on(
    client: &FixClient,
    peers: &mut mpsc::UnboundedReceiver<Peer>,
) -> Peer {
    client.connect().await.expect("connect");
    let mut peer = peers.recv().await.expect("no connection accepted");

    let logon = {
        let client = client.clone();
        tokio::spawn(async move { client.logon().await })
    };
    let request = peer.expect(MsgType::Logon).await;
    let reset = request.get_bool(conduit_fix::tags::RESET_SEQ_NUM_FLAG);
    if reset {
        peer.next_seq = 1;
    }
    peer.send(&FixMessage::logon(30, reset)).await;
    logon.await.expect("logon task").expect("logon");
    peer
}

/// Wait for the first event matching `pred`
pub async fn wait_for(
    events: &mut broadcast::Receiver<FixEvent>,
    pred: impl Fn(&FixEvent) -> bool,
) -> FixEvent {
    timeout(RECV_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
