//! Session actor
//!
//! One tokio task per FIX session owns the stream, the frame decoder and all
//! sequence state. Commands from [`FixClient`](crate::FixClient) handles,
//! inbound stream events and timers (heartbeat, test request, logon timeout,
//! reconnect backoff) are multiplexed in a single `select!` loop, so sends and
//! received-byte processing are strictly ordered.

use conduit_core::backoff_delay;
use conduit_ports::{ByteSink, Clock, StreamConnector, StreamEvent};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use uuid::Uuid;

use crate::codec::{self, FrameDecoder, Header};
use crate::error::{FixError, Result};
use crate::events::FixEvent;
use crate::message_log::{Direction, MessageLog, MessageLogEntry};
use crate::message::FixMessage;
use crate::session::{SessionConfig, SessionState, SessionStatus};
use crate::tags::{self, MsgType};

/// Upper bound on a single reconnect wait, whatever the policy says
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) enum Command {
    Connect {
        reply: oneshot::Sender<Result<()>>,
    },
    Logon {
        reset: Option<bool>,
        reply: oneshot::Sender<Result<()>>,
    },
    Logout {
        text: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Send {
        message: FixMessage,
        reply: oneshot::Sender<Result<u64>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    SetSequenceNumbers {
        outgoing: u64,
        incoming: u64,
        reply: oneshot::Sender<()>,
    },
}

/// Logon sent, acknowledgment outstanding. `reply` is `None` when the logon
/// was issued by the reconnect loop rather than a caller.
struct PendingLogon {
    reply: Option<oneshot::Sender<Result<()>>>,
    deadline: Instant,
}

pub(crate) struct SessionEngine {
    config: Arc<SessionConfig>,
    state: SessionState,
    connector: Arc<dyn StreamConnector>,
    clock: Arc<dyn Clock>,
    sink: Option<Box<dyn ByteSink>>,
    inbound: Option<mpsc::Receiver<StreamEvent>>,
    decoder: FrameDecoder,
    events: broadcast::Sender<FixEvent>,
    log: Arc<Mutex<MessageLog>>,
    pending_logon: Option<PendingLogon>,
    heartbeat: Option<Interval>,
    test_request_deadline: Option<Instant>,
    test_request_counter: u64,
    reconnect_at: Option<Instant>,
    in_reconnect_cycle: bool,
    disconnect_requested: bool,
    awaiting_logout: bool,
}

impl SessionEngine {
    pub(crate) fn new(
        config: Arc<SessionConfig>,
        connector: Arc<dyn StreamConnector>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<FixEvent>,
        log: Arc<Mutex<MessageLog>>,
    ) -> Self {
        let state = SessionState::new(config.session_id(), config.version);
        Self {
            config,
            state,
            connector,
            clock,
            sink: None,
            inbound: None,
            decoder: FrameDecoder::new(),
            events,
            log,
            pending_logon: None,
            heartbeat: None,
            test_request_deadline: None,
            test_request_counter: 0,
            reconnect_at: None,
            in_reconnect_cycle: false,
            disconnect_requested: false,
            awaiting_logout: false,
        }
    }

    /// Main loop - runs until every client handle is dropped
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!("[{}] FIX session task started", self.state.session_id);

        loop {
            let test_request_deadline = self.test_request_deadline;
            let logon_deadline = self.pending_logon.as_ref().map(|p| p.deadline);
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                event = next_stream_event(&mut self.inbound) => {
                    self.handle_stream_event(event).await;
                }
                _ = next_tick(&mut self.heartbeat) => self.on_heartbeat_tick().await,
                _ = sleep_until_opt(test_request_deadline) => self.on_test_request_timeout().await,
                _ = sleep_until_opt(logon_deadline) => self.on_logon_timeout().await,
                _ = sleep_until_opt(reconnect_at) => self.attempt_reconnect().await,
            }
        }

        self.teardown_stream().await;
        info!("[{}] FIX session task stopped", self.state.session_id);
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Logon { reset, reply } => self.logon(reset, reply).await,
            Command::Logout { text, reply } => {
                let result = self.logout(text.as_deref()).await;
                let _ = reply.send(result);
            }
            Command::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
            Command::Send { message, reply } => {
                let result = self.send_application(message).await;
                let _ = reply.send(result);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::SetSequenceNumbers {
                outgoing,
                incoming,
                reply,
            } => {
                info!(
                    "[{}] Sequence numbers set: out={} in={}",
                    self.state.session_id, outgoing, incoming
                );
                self.state.outgoing_seq_num = outgoing.max(1);
                self.state.incoming_seq_num = incoming.max(1);
                self.state.pending_resend = false;
                let _ = reply.send(());
            }
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    async fn connect(&mut self) -> Result<()> {
        if !self.state.status.can_connect() {
            return Err(FixError::InvalidState(self.state.status));
        }
        self.disconnect_requested = false;
        self.in_reconnect_cycle = false;
        self.reconnect_at = None;
        self.open_stream().await?;
        self.state.reconnect_attempts = 0;
        Ok(())
    }

    async fn open_stream(&mut self) -> Result<()> {
        self.set_status(SessionStatus::Connecting);
        self.emit(FixEvent::Connecting);
        info!(
            "[{}] Connecting to {}:{}",
            self.state.session_id, self.config.host, self.config.port
        );

        match self.connector.connect(&self.config.host, self.config.port).await {
            Ok(handle) => {
                self.sink = Some(handle.sink);
                self.inbound = Some(handle.events);
                self.decoder.clear();
                self.set_status(SessionStatus::Connected);
                self.emit(FixEvent::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("[{}] Connect failed: {}", self.state.session_id, e);
                self.emit(FixEvent::Error(e.to_string()));
                if !self.in_reconnect_cycle {
                    self.set_status(SessionStatus::Disconnected);
                }
                Err(e.into())
            }
        }
    }

    async fn logon(&mut self, reset: Option<bool>, reply: oneshot::Sender<Result<()>>) {
        if self.state.status != SessionStatus::Connected || self.sink.is_none() {
            let _ = reply.send(Err(FixError::NotConnected));
            return;
        }
        if self.state.logged_on {
            let _ = reply.send(Ok(()));
            return;
        }
        if self.pending_logon.is_some() {
            let _ = reply.send(Err(FixError::InvalidState(self.state.status)));
            return;
        }

        let reset = reset.unwrap_or(self.config.reset_on_logon);
        match self.send_logon(reset).await {
            Ok(()) => {
                self.pending_logon = Some(PendingLogon {
                    reply: Some(reply),
                    deadline: Instant::now() + self.config.logon_timeout(),
                });
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn send_logon(&mut self, reset: bool) -> Result<()> {
        if reset {
            self.state.reset_sequence_numbers();
        }
        let msg = FixMessage::logon(self.config.heartbeat_interval_secs, reset);
        self.send(&msg).await.map(|_| ())
    }

    async fn logout(&mut self, text: Option<&str>) -> Result<()> {
        if !self.state.logged_on {
            return Err(FixError::NotLoggedOn);
        }
        self.stop_heartbeats();
        self.state.logged_on = false;
        self.awaiting_logout = true;
        self.send(&FixMessage::logout(text)).await.map(|_| ())
    }

    async fn disconnect(&mut self) {
        self.disconnect_requested = true;
        self.reconnect_at = None;
        self.in_reconnect_cycle = false;
        self.stop_heartbeats();

        if self.state.logged_on
            && let Err(e) = self.logout(None).await
        {
            debug!(
                "[{}] Ignoring logout failure during disconnect: {}",
                self.state.session_id, e
            );
        }

        self.fail_pending_logon(FixError::SessionClosed);
        self.teardown_stream().await;
        self.state.logged_on = false;
        self.awaiting_logout = false;
        self.set_status(SessionStatus::Disconnected);
        self.emit(FixEvent::Disconnected);
    }

    async fn teardown_stream(&mut self) {
        if let Some(mut sink) = self.sink.take() {
            sink.close().await;
        }
        self.inbound = None;
        self.decoder.clear();
        self.stop_heartbeats();
    }

    fn fail_pending_logon(&mut self, err: FixError) {
        if let Some(PendingLogon {
            reply: Some(reply), ..
        }) = self.pending_logon.take()
        {
            let _ = reply.send(Err(err));
        }
    }

    // ------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------

    async fn send_application(&mut self, message: FixMessage) -> Result<u64> {
        if !self.state.logged_on {
            return Err(if self.sink.is_some() {
                FixError::NotLoggedOn
            } else {
                FixError::NotConnected
            });
        }
        self.send(&message).await
    }

    /// Stamp the next sequence number, encode and write
    ///
    /// The sequence number is consumed before the write, so a failed write
    /// never causes a number to be reused.
    async fn send(&mut self, msg: &FixMessage) -> Result<u64> {
        if self.sink.is_none() {
            return Err(FixError::NotConnected);
        }
        let seq = self.state.outgoing_seq_num;
        self.state.outgoing_seq_num += 1;

        let raw = codec::encode(
            msg,
            &Header {
                version: self.config.version,
                sender_comp_id: &self.config.sender_comp_id,
                target_comp_id: &self.config.target_comp_id,
                seq_num: seq,
                sending_time: self.clock.now(),
            },
        );

        let sink = self.sink.as_mut().ok_or(FixError::NotConnected)?;
        sink.write(raw.as_bytes()).await?;

        debug!("[{}] >> {}", self.state.session_id, codec::printable(&raw));
        self.record(Direction::Sent, msg.msg_type(), seq, raw);
        Ok(seq)
    }

    fn record(&self, direction: Direction, msg_type: MsgType, seq_num: u64, raw: String) {
        if !self.config.persist_messages {
            return;
        }
        self.log.lock().record(MessageLogEntry {
            id: Uuid::new_v4(),
            session_id: self.state.session_id.clone(),
            direction,
            msg_type,
            seq_num,
            raw,
            timestamp: self.clock.now(),
        });
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    async fn handle_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Data(bytes) => {
                self.decoder.push(&bytes);
                while let Some(frame) = self.decoder.next_frame() {
                    self.handle_frame(frame).await;
                }
            }
            StreamEvent::Closed => self.on_connection_lost("stream closed").await,
            StreamEvent::Error(e) => {
                self.emit(FixEvent::Error(e.clone()));
                self.on_connection_lost(&e).await;
            }
        }
    }

    async fn handle_frame(&mut self, raw: String) {
        if let Err(e) = codec::verify_checksum(&raw) {
            warn!(
                "[{}] Dropping frame: {} ({})",
                self.state.session_id,
                e,
                codec::printable(&raw)
            );
            return;
        }
        let msg = match codec::decode(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[{}] Dropping frame: {}", self.state.session_id, e);
                return;
            }
        };
        let Some(seq) = msg.seq_num() else {
            warn!(
                "[{}] Dropping frame without MsgSeqNum: {}",
                self.state.session_id,
                codec::printable(&raw)
            );
            return;
        };

        debug!("[{}] << {}", self.state.session_id, codec::printable(&raw));
        self.record(Direction::Received, msg.msg_type(), seq, raw);
        self.process_inbound(msg, seq).await;
    }

    /// Sequence discipline: gaps trigger one resend request, stale messages
    /// are dropped, SequenceReset is always honored
    async fn process_inbound(&mut self, msg: FixMessage, seq: u64) {
        let msg_type = msg.msg_type();

        if msg_type == MsgType::SequenceReset {
            self.on_sequence_reset(&msg);
            return;
        }
        if msg_type == MsgType::Logon && msg.get_bool(tags::RESET_SEQ_NUM_FLAG) {
            self.state.incoming_seq_num = seq;
        }

        let expected = self.state.incoming_seq_num;
        if seq > expected {
            self.request_resend(expected, seq - 1).await;
            // Session-level requests are still served while the gap is filled
            if matches!(
                msg_type,
                MsgType::Logon | MsgType::Logout | MsgType::ResendRequest
            ) {
                self.dispatch(msg).await;
            }
            return;
        }
        if seq < expected {
            debug!(
                "[{}] Ignoring {} with stale seq {} (expected {})",
                self.state.session_id, msg_type, seq, expected
            );
            return;
        }

        self.state.incoming_seq_num = seq + 1;
        self.state.pending_resend = false;
        self.dispatch(msg).await;
    }

    async fn request_resend(&mut self, begin: u64, end: u64) {
        if self.state.pending_resend {
            debug!(
                "[{}] Resend already outstanding, not re-requesting {}..{}",
                self.state.session_id, begin, end
            );
            return;
        }
        info!(
            "[{}] Sequence gap: requesting resend {}..{}",
            self.state.session_id, begin, end
        );
        match self.send(&FixMessage::resend_request(begin, end)).await {
            Ok(_) => self.state.pending_resend = true,
            Err(e) => warn!("[{}] Resend request failed: {}", self.state.session_id, e),
        }
    }

    async fn dispatch(&mut self, msg: FixMessage) {
        match msg.msg_type() {
            MsgType::Heartbeat => {
                let test_req_id = msg.get_text(tags::TEST_REQ_ID);
                if test_req_id.is_some() && test_req_id == self.state.test_request_id {
                    self.state.test_request_id = None;
                    self.test_request_deadline = None;
                }
                self.emit(FixEvent::Heartbeat { test_req_id });
            }
            MsgType::TestRequest => {
                let test_req_id = msg.get_text(tags::TEST_REQ_ID);
                if let Err(e) = self
                    .send(&FixMessage::heartbeat(test_req_id.as_deref()))
                    .await
                {
                    warn!("[{}] Heartbeat reply failed: {}", self.state.session_id, e);
                }
            }
            MsgType::ResendRequest => self.on_resend_request(&msg).await,
            MsgType::Reject => {
                warn!(
                    "[{}] Session reject for seq {:?}: {}",
                    self.state.session_id,
                    msg.get_u64(tags::REF_SEQ_NUM),
                    msg.get_text(tags::TEXT).unwrap_or_default()
                );
                self.emit(FixEvent::Reject(msg));
            }
            MsgType::Logon => self.on_logon_ack(),
            MsgType::Logout => self.on_logout(&msg).await,
            MsgType::ExecutionReport => self.emit(FixEvent::ExecutionReport(msg)),
            MsgType::OrderCancelReject => self.emit(FixEvent::OrderCancelReject(msg)),
            // handled before sequence checks
            MsgType::SequenceReset => {}
            other => debug!("[{}] Ignoring inbound {}", self.state.session_id, other),
        }
    }

    fn on_sequence_reset(&mut self, msg: &FixMessage) {
        let Some(new_seq_num) = msg.get_u64(tags::NEW_SEQ_NO) else {
            warn!("[{}] SequenceReset without NewSeqNo", self.state.session_id);
            return;
        };
        let gap_fill = msg.get_bool(tags::GAP_FILL_FLAG);
        info!(
            "[{}] SequenceReset{}: incoming {} -> {}",
            self.state.session_id,
            if gap_fill { " (gap fill)" } else { "" },
            self.state.incoming_seq_num,
            new_seq_num
        );
        self.state.incoming_seq_num = new_seq_num;
        self.state.pending_resend = false;
        self.emit(FixEvent::SequenceReset {
            new_seq_num,
            gap_fill,
        });
    }

    /// Answer a resend request with a gap fill instead of replaying history
    ///
    /// The gap fill carries the requested BeginSeqNo as its own sequence
    /// number and moves the peer straight to our current outgoing number.
    async fn on_resend_request(&mut self, msg: &FixMessage) {
        let begin = msg.get_u64(tags::BEGIN_SEQ_NO).unwrap_or(1).max(1);
        let current = self.state.outgoing_seq_num;
        info!(
            "[{}] Resend requested from {}; gap fill to {}",
            self.state.session_id, begin, current
        );

        self.state.outgoing_seq_num = begin;
        let result = self.send(&FixMessage::sequence_reset(current, true)).await;
        self.state.outgoing_seq_num = current;

        if let Err(e) = result {
            warn!("[{}] Gap fill failed: {}", self.state.session_id, e);
        }
    }

    fn on_logon_ack(&mut self) {
        let Some(pending) = self.pending_logon.take() else {
            debug!("[{}] Ignoring unsolicited logon", self.state.session_id);
            return;
        };
        self.state.logged_on = true;
        self.start_heartbeats();
        info!("[{}] Logged on", self.state.session_id);
        self.emit(FixEvent::LoggedOn);

        if let Some(reply) = pending.reply {
            let _ = reply.send(Ok(()));
        }
        if self.in_reconnect_cycle {
            self.in_reconnect_cycle = false;
            self.state.reconnect_attempts = 0;
            info!("[{}] Reconnected", self.state.session_id);
            self.emit(FixEvent::Reconnected);
        }
    }

    async fn on_logout(&mut self, msg: &FixMessage) {
        let text = msg
            .get_text(tags::TEXT)
            .unwrap_or_else(|| "logout".to_string());

        if let Some(pending) = self.pending_logon.take() {
            warn!("[{}] Logon rejected: {}", self.state.session_id, text);
            self.emit(FixEvent::LogonReject {
                reason: text.clone(),
            });
            if let Some(reply) = pending.reply {
                let _ = reply.send(Err(FixError::LogonRejected(text)));
            }
            if self.in_reconnect_cycle {
                self.teardown_stream().await;
                self.schedule_reconnect();
            }
            return;
        }

        if self.awaiting_logout {
            self.awaiting_logout = false;
            info!("[{}] Logout confirmed", self.state.session_id);
            return;
        }

        if self.state.logged_on {
            info!("[{}] Peer initiated logout: {}", self.state.session_id, text);
            self.state.logged_on = false;
            self.stop_heartbeats();
            if let Err(e) = self.send(&FixMessage::logout(None)).await {
                debug!("[{}] Logout reply failed: {}", self.state.session_id, e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------

    fn start_heartbeats(&mut self) {
        let period = self.config.heartbeat_interval();
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(interval);
        self.test_request_deadline = None;
        self.state.test_request_id = None;
    }

    fn stop_heartbeats(&mut self) {
        self.heartbeat = None;
        self.test_request_deadline = None;
        self.state.test_request_id = None;
    }

    async fn on_heartbeat_tick(&mut self) {
        if !self.state.logged_on {
            return;
        }
        if let Err(e) = self.send(&FixMessage::heartbeat(None)).await {
            warn!("[{}] Heartbeat failed: {}", self.state.session_id, e);
            return;
        }
        if self.state.test_request_id.is_none() {
            self.test_request_counter += 1;
            let id = format!("TEST-{}", self.test_request_counter);
            match self.send(&FixMessage::test_request(&id)).await {
                Ok(_) => {
                    self.state.test_request_id = Some(id);
                    self.test_request_deadline =
                        Some(Instant::now() + self.config.heartbeat_interval());
                }
                Err(e) => warn!("[{}] Test request failed: {}", self.state.session_id, e),
            }
        }
    }

    async fn on_test_request_timeout(&mut self) {
        self.test_request_deadline = None;
        let id = self.state.test_request_id.take();
        warn!(
            "[{}] No heartbeat for test request {:?}; closing stream",
            self.state.session_id, id
        );
        self.emit(FixEvent::Error("heartbeat timeout".to_string()));
        self.on_connection_lost("heartbeat timeout").await;
    }

    async fn on_logon_timeout(&mut self) {
        let Some(pending) = self.pending_logon.take() else {
            return;
        };
        let secs = self.config.logon_timeout_secs;
        warn!("[{}] Logon timed out after {}s", self.state.session_id, secs);
        self.emit(FixEvent::Error(format!("logon timeout after {}s", secs)));
        if let Some(reply) = pending.reply {
            let _ = reply.send(Err(FixError::LogonTimeout(secs)));
        }
        if self.in_reconnect_cycle {
            self.teardown_stream().await;
            self.schedule_reconnect();
        }
    }

    // ------------------------------------------------------------------
    // Reconnection
    // ------------------------------------------------------------------

    async fn on_connection_lost(&mut self, reason: &str) {
        let was_logged_on = self.state.logged_on;
        self.teardown_stream().await;
        self.state.logged_on = false;
        self.awaiting_logout = false;
        self.fail_pending_logon(FixError::SessionClosed);

        if self.disconnect_requested {
            self.set_status(SessionStatus::Disconnected);
            return;
        }

        warn!("[{}] Connection lost: {}", self.state.session_id, reason);
        self.emit(FixEvent::Disconnected);

        if (was_logged_on || self.in_reconnect_cycle) && self.config.reconnect.enabled {
            self.in_reconnect_cycle = true;
            self.schedule_reconnect();
        } else {
            self.set_status(SessionStatus::Disconnected);
        }
    }

    fn schedule_reconnect(&mut self) {
        let policy = &self.config.reconnect;
        let attempts = self.state.reconnect_attempts;

        if !policy.allows_attempt(attempts) {
            error!(
                "[{}] Reconnection failed after {} attempts",
                self.state.session_id, attempts
            );
            self.in_reconnect_cycle = false;
            self.reconnect_at = None;
            self.set_status(SessionStatus::Error);
            self.emit(FixEvent::ReconnectFailed { attempts });
            return;
        }

        let delay = backoff_delay(policy, attempts).min(MAX_RECONNECT_DELAY);
        let max_attempts = policy.max_attempts;
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_status(SessionStatus::Reconnecting);
        info!(
            "[{}] Reconnecting in {:?} (attempt {}/{})",
            self.state.session_id,
            delay,
            attempts + 1,
            max_attempts
        );
        self.emit(FixEvent::Reconnecting {
            attempt: attempts + 1,
            delay_ms: delay.as_millis() as u64,
        });
    }

    async fn attempt_reconnect(&mut self) {
        self.reconnect_at = None;
        if self.disconnect_requested
            || !self.in_reconnect_cycle
            || self.state.status != SessionStatus::Reconnecting
        {
            debug!(
                "[{}] Reconnect cancelled (status {})",
                self.state.session_id, self.state.status
            );
            return;
        }

        self.state.reconnect_attempts += 1;
        if self.open_stream().await.is_err() {
            self.schedule_reconnect();
            return;
        }

        match self.send_logon(self.config.reset_on_logon).await {
            Ok(()) => {
                self.pending_logon = Some(PendingLogon {
                    reply: None,
                    deadline: Instant::now() + self.config.logon_timeout(),
                });
            }
            Err(e) => {
                warn!(
                    "[{}] Logon after reconnect failed: {}",
                    self.state.session_id, e
                );
                self.teardown_stream().await;
                self.schedule_reconnect();
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn set_status(&mut self, status: SessionStatus) {
        if self.state.status != status {
            debug!(
                "[{}] {} -> {}",
                self.state.session_id, self.state.status, status
            );
            self.state.status = status;
        }
    }

    fn emit(&self, event: FixEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn next_stream_event(inbound: &mut Option<mpsc::Receiver<StreamEvent>>) -> StreamEvent {
    match inbound {
        Some(rx) => rx.recv().await.unwrap_or(StreamEvent::Closed),
        None => pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
