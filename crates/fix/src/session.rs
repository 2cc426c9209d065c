//! Session configuration and state

use conduit_core::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::message_log::MessageLog;
use crate::tags::FixVersion;

/// Connection status of a FIX session
///
/// ```text
/// DISCONNECTED → CONNECTING → CONNECTED → (RECONNECTING ⇄ CONNECTING) → ERROR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl SessionStatus {
    /// States from which `connect()` may start
    pub fn can_connect(&self) -> bool {
        matches!(self, SessionStatus::Disconnected | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "DISCONNECTED",
            SessionStatus::Connecting => "CONNECTING",
            SessionStatus::Connected => "CONNECTED",
            SessionStatus::Reconnecting => "RECONNECTING",
            SessionStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Per-exchange FIX session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub sender_comp_id: String,
    pub target_comp_id: String,
    pub host: String,
    pub port: u16,
    pub version: FixVersion,
    pub heartbeat_interval_secs: u64,
    /// Send ResetSeqNumFlag=Y on logon (resets both counters to 1)
    pub reset_on_logon: bool,
    /// Record every sent/received frame in the message log
    pub persist_messages: bool,
    pub message_log_capacity: usize,
    pub logon_timeout_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sender_comp_id: "CLIENT".to_string(),
            target_comp_id: "EXCHANGE".to_string(),
            host: "127.0.0.1".to_string(),
            port: 9878,
            version: FixVersion::Fix44,
            heartbeat_interval_secs: 30,
            reset_on_logon: false,
            persist_messages: true,
            message_log_capacity: MessageLog::DEFAULT_CAPACITY,
            logon_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: FixVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_heartbeat_interval(mut self, secs: u64) -> Self {
        self.heartbeat_interval_secs = secs;
        self
    }

    pub fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    pub fn with_persistence(mut self, enabled: bool, capacity: usize) -> Self {
        self.persist_messages = enabled;
        self.message_log_capacity = capacity;
        self
    }

    pub fn with_logon_timeout(mut self, secs: u64) -> Self {
        self.logon_timeout_secs = secs;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// `SENDER->TARGET`
    pub fn session_id(&self) -> String {
        format!("{}->{}", self.sender_comp_id, self.target_comp_id)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn logon_timeout(&self) -> Duration {
        Duration::from_secs(self.logon_timeout_secs)
    }
}

/// Snapshot of a session's protocol state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub session_id: String,
    pub version: FixVersion,
    pub status: SessionStatus,
    /// Sequence number the next outbound message will carry
    pub outgoing_seq_num: u64,
    /// Sequence number expected on the next inbound message
    pub incoming_seq_num: u64,
    pub logged_on: bool,
    /// A resend request is outstanding for an inbound gap
    pub pending_resend: bool,
    pub test_request_id: Option<String>,
    pub reconnect_attempts: u32,
}

impl SessionState {
    pub fn new(session_id: String, version: FixVersion) -> Self {
        Self {
            session_id,
            version,
            status: SessionStatus::Disconnected,
            outgoing_seq_num: 1,
            incoming_seq_num: 1,
            logged_on: false,
            pending_resend: false,
            test_request_id: None,
            reconnect_attempts: 0,
        }
    }

    pub fn reset_sequence_numbers(&mut self) {
        self.outgoing_seq_num = 1;
        self.incoming_seq_num = 1;
        self.pending_resend = false;
    }
}
