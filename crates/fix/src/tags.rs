//! FIX tag numbers, message types and protocol versions

use serde::{Deserialize, Serialize};
use std::fmt;

// Standard header / trailer
pub const BEGIN_STRING: u32 = 8;
pub const BODY_LENGTH: u32 = 9;
pub const MSG_TYPE: u32 = 35;
pub const SENDER_COMP_ID: u32 = 49;
pub const TARGET_COMP_ID: u32 = 56;
pub const MSG_SEQ_NUM: u32 = 34;
pub const SENDING_TIME: u32 = 52;
pub const POSS_DUP_FLAG: u32 = 43;
pub const CHECKSUM: u32 = 10;

// Session level
pub const ENCRYPT_METHOD: u32 = 98;
pub const HEART_BT_INT: u32 = 108;
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
pub const TEST_REQ_ID: u32 = 112;
pub const BEGIN_SEQ_NO: u32 = 7;
pub const END_SEQ_NO: u32 = 16;
pub const GAP_FILL_FLAG: u32 = 123;
pub const NEW_SEQ_NO: u32 = 36;
pub const REF_SEQ_NUM: u32 = 45;
pub const TEXT: u32 = 58;

// Order identification
pub const CL_ORD_ID: u32 = 11;
pub const ORIG_CL_ORD_ID: u32 = 41;
pub const ORDER_ID: u32 = 37;
pub const EXEC_ID: u32 = 17;

// Order attributes
pub const SYMBOL: u32 = 55;
pub const SIDE: u32 = 54;
pub const ORD_TYPE: u32 = 40;
pub const PRICE: u32 = 44;
pub const ORDER_QTY: u32 = 38;
pub const TIME_IN_FORCE: u32 = 59;
pub const TRANSACT_TIME: u32 = 60;

// Execution report
pub const EXEC_TYPE: u32 = 150;
pub const ORD_STATUS: u32 = 39;
pub const LAST_PX: u32 = 31;
pub const LAST_QTY: u32 = 32;
pub const LEAVES_QTY: u32 = 151;
pub const CUM_QTY: u32 = 14;
pub const AVG_PX: u32 = 6;
pub const CXL_REJ_REASON: u32 = 102;

/// Tags written by the encoder itself; never copied from a message's field map
pub const HEADER_TAGS: [u32; 8] = [
    BEGIN_STRING,
    BODY_LENGTH,
    MSG_TYPE,
    SENDER_COMP_ID,
    TARGET_COMP_ID,
    MSG_SEQ_NUM,
    SENDING_TIME,
    CHECKSUM,
];

/// Message types handled by the session engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Heartbeat,
    TestRequest,
    ResendRequest,
    Reject,
    SequenceReset,
    Logout,
    Logon,
    NewOrderSingle,
    OrderCancelRequest,
    OrderCancelReplaceRequest,
    OrderStatusRequest,
    ExecutionReport,
    OrderCancelReject,
}

impl MsgType {
    /// Wire value of tag 35
    pub fn as_str(&self) -> &'static str {
        match self {
            MsgType::Heartbeat => "0",
            MsgType::TestRequest => "1",
            MsgType::ResendRequest => "2",
            MsgType::Reject => "3",
            MsgType::SequenceReset => "4",
            MsgType::Logout => "5",
            MsgType::Logon => "A",
            MsgType::NewOrderSingle => "D",
            MsgType::OrderCancelRequest => "F",
            MsgType::OrderCancelReplaceRequest => "G",
            MsgType::OrderStatusRequest => "H",
            MsgType::ExecutionReport => "8",
            MsgType::OrderCancelReject => "9",
        }
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        let t = match value {
            "0" => MsgType::Heartbeat,
            "1" => MsgType::TestRequest,
            "2" => MsgType::ResendRequest,
            "3" => MsgType::Reject,
            "4" => MsgType::SequenceReset,
            "5" => MsgType::Logout,
            "A" => MsgType::Logon,
            "D" => MsgType::NewOrderSingle,
            "F" => MsgType::OrderCancelRequest,
            "G" => MsgType::OrderCancelReplaceRequest,
            "H" => MsgType::OrderStatusRequest,
            "8" => MsgType::ExecutionReport,
            "9" => MsgType::OrderCancelReject,
            _ => return None,
        };
        Some(t)
    }

    /// Session-level (administrative) message
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            MsgType::Heartbeat
                | MsgType::TestRequest
                | MsgType::ResendRequest
                | MsgType::Reject
                | MsgType::SequenceReset
                | MsgType::Logout
                | MsgType::Logon
        )
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_str())
    }
}

/// Protocol version carried in BeginString (tag 8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FixVersion {
    #[serde(rename = "4.2", alias = "FIX.4.2")]
    Fix42,
    #[default]
    #[serde(rename = "4.4", alias = "FIX.4.4")]
    Fix44,
}

impl FixVersion {
    pub fn begin_string(&self) -> &'static str {
        match self {
            FixVersion::Fix42 => "FIX.4.2",
            FixVersion::Fix44 => "FIX.4.4",
        }
    }
}

impl fmt::Display for FixVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.begin_string())
    }
}
