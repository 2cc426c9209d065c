use crate::message::FixMessage;

/// Notifications published by a FIX session, in the order they happen
#[derive(Debug, Clone, PartialEq)]
pub enum FixEvent {
    Connecting,
    Connected,
    LoggedOn,
    LogonReject { reason: String },
    /// Heartbeat received from the peer
    Heartbeat { test_req_id: Option<String> },
    ExecutionReport(FixMessage),
    OrderCancelReject(FixMessage),
    Reject(FixMessage),
    SequenceReset { new_seq_num: u64, gap_fill: bool },
    Disconnected,
    Reconnecting { attempt: u32, delay_ms: u64 },
    Reconnected,
    /// Reconnection attempts exhausted; the session stays in ERROR
    ReconnectFailed { attempts: u32 },
    Error(String),
}

impl FixEvent {
    /// Short event name, matching the subscription names used by callers
    pub fn name(&self) -> &'static str {
        match self {
            FixEvent::Connecting => "connecting",
            FixEvent::Connected => "connected",
            FixEvent::LoggedOn => "loggedOn",
            FixEvent::LogonReject { .. } => "logonReject",
            FixEvent::Heartbeat { .. } => "heartbeat",
            FixEvent::ExecutionReport(_) => "executionReport",
            FixEvent::OrderCancelReject(_) => "orderCancelReject",
            FixEvent::Reject(_) => "reject",
            FixEvent::SequenceReset { .. } => "sequenceReset",
            FixEvent::Disconnected => "disconnected",
            FixEvent::Reconnecting { .. } => "reconnecting",
            FixEvent::Reconnected => "reconnected",
            FixEvent::ReconnectFailed { .. } => "reconnectFailed",
            FixEvent::Error(_) => "error",
        }
    }
}
