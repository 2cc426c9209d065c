//! Cloneable handle to a running FIX session

use conduit_ports::{Clock, StreamConnector};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::codec;
use crate::engine::{Command, SessionEngine};
use crate::error::{FixError, Result};
use crate::events::FixEvent;
use crate::message_log::{LogQuery, MessageLog, MessageLogEntry};
use crate::message::FixMessage;
use crate::session::{SessionConfig, SessionState};

const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 1_024;

/// Handle to one FIX session
///
/// Every call is forwarded to the session task, which processes them one at
/// a time. Clones share the same session.
#[derive(Clone)]
pub struct FixClient {
    session_id: String,
    config: Arc<SessionConfig>,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<FixEvent>,
    log: Arc<Mutex<MessageLog>>,
}

impl FixClient {
    /// Start the session task. The session begins DISCONNECTED.
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn StreamConnector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let log = Arc::new(Mutex::new(MessageLog::new(config.message_log_capacity)));

        let engine = SessionEngine::new(
            Arc::clone(&config),
            connector,
            clock,
            events.clone(),
            Arc::clone(&log),
        );
        tokio::spawn(engine.run(command_rx));

        Self {
            session_id: config.session_id(),
            config,
            commands,
            events,
            log,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| FixError::SessionClosed)?;
        rx.await.map_err(|_| FixError::SessionClosed)
    }

    /// Open the stream. Allowed from DISCONNECTED or ERROR.
    pub async fn connect(&self) -> Result<()> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Send Logon and wait for the acknowledgment, a reject or the logon timeout
    pub async fn logon(&self) -> Result<()> {
        self.request(|reply| Command::Logon { reset: None, reply })
            .await?
    }

    /// Logon overriding the configured ResetSeqNumFlag behavior
    pub async fn logon_with_reset(&self, reset: bool) -> Result<()> {
        self.request(|reply| Command::Logon {
            reset: Some(reset),
            reply,
        })
        .await?
    }

    pub async fn logout(&self, text: Option<&str>) -> Result<()> {
        let text = text.map(str::to_string);
        self.request(|reply| Command::Logout { text, reply }).await?
    }

    /// Log out if logged on, close the stream and cancel any pending reconnect
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|reply| Command::Disconnect { reply }).await
    }

    /// Send an application message, returning the sequence number it carried
    pub async fn send_message(&self, message: FixMessage) -> Result<u64> {
        self.request(|reply| Command::Send { message, reply })
            .await?
    }

    pub async fn session_state(&self) -> Result<SessionState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Override both sequence counters, e.g. after an out-of-band reset
    pub async fn set_sequence_numbers(&self, outgoing: u64, incoming: u64) -> Result<()> {
        self.request(|reply| Command::SetSequenceNumbers {
            outgoing,
            incoming,
            reply,
        })
        .await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FixEvent> {
        self.events.subscribe()
    }

    pub fn message_log(&self, query: &LogQuery) -> Vec<MessageLogEntry> {
        self.log.lock().query(query)
    }

    pub fn clear_message_log(&self) {
        self.log.lock().clear();
    }

    /// Decode a raw wire message without touching session state
    pub fn parse_message(raw: &str) -> Result<FixMessage> {
        codec::decode(raw)
    }
}

impl std::fmt::Debug for FixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixClient")
            .field("session_id", &self.session_id)
            .finish()
    }
}
