//! Structured FIX messages
//!
//! A [`FixMessage`] is a message type plus an ordered map from tag to value.
//! Messages are immutable once built; use the `with_*` builders to construct
//! them and the accessors to read them.

use indexmap::IndexMap;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use crate::tags::{self, MsgType};

/// Value of a single FIX field
///
/// Numeric variants are only produced when the wire text is the canonical
/// rendering of the number, so every value re-encodes byte-identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FixValue {
    Int(i64),
    Decimal(Decimal),
    Text(String),
}

impl FixValue {
    /// Parse a wire value, preferring integer, then decimal, then text
    pub fn parse(raw: &str) -> Self {
        if let Ok(n) = raw.parse::<i64>()
            && n.to_string() == raw
        {
            return FixValue::Int(n);
        }
        if raw.contains('.')
            && let Ok(d) = Decimal::from_str(raw)
            && d.to_string() == raw
        {
            return FixValue::Decimal(d);
        }
        FixValue::Text(raw.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FixValue::Int(n) => Some(*n),
            FixValue::Decimal(_) => None,
            FixValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().and_then(|n| u64::try_from(n).ok())
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            FixValue::Int(n) => Some(Decimal::from(*n)),
            FixValue::Decimal(d) => Some(*d),
            FixValue::Text(s) => Decimal::from_str(s).ok(),
        }
    }

    /// `Y` / `N` boolean fields
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FixValue::Text(s) if s == "Y" => Some(true),
            FixValue::Text(s) if s == "N" => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for FixValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixValue::Int(n) => write!(f, "{}", n),
            FixValue::Decimal(d) => write!(f, "{}", d),
            FixValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FixValue {
    fn from(n: i64) -> Self {
        FixValue::Int(n)
    }
}

impl From<u64> for FixValue {
    fn from(n: u64) -> Self {
        match i64::try_from(n) {
            Ok(n) => FixValue::Int(n),
            Err(_) => FixValue::Text(n.to_string()),
        }
    }
}

impl From<u32> for FixValue {
    fn from(n: u32) -> Self {
        FixValue::Int(i64::from(n))
    }
}

impl From<Decimal> for FixValue {
    fn from(d: Decimal) -> Self {
        FixValue::Decimal(d)
    }
}

impl From<bool> for FixValue {
    fn from(b: bool) -> Self {
        FixValue::Text(if b { "Y" } else { "N" }.to_string())
    }
}

impl From<&str> for FixValue {
    fn from(s: &str) -> Self {
        FixValue::Text(s.to_string())
    }
}

impl From<String> for FixValue {
    fn from(s: String) -> Self {
        FixValue::Text(s)
    }
}

/// A structured FIX message
#[derive(Debug, Clone, PartialEq)]
pub struct FixMessage {
    msg_type: MsgType,
    fields: IndexMap<u32, FixValue>,
    raw: Option<String>,
}

impl FixMessage {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            msg_type,
            fields: IndexMap::new(),
            raw: None,
        }
    }

    /// Build from decoded parts, keeping the wire text
    pub(crate) fn from_wire(
        msg_type: MsgType,
        fields: IndexMap<u32, FixValue>,
        raw: String,
    ) -> Self {
        Self {
            msg_type,
            fields,
            raw: Some(raw),
        }
    }

    /// Add or replace a field
    pub fn with_field(mut self, tag: u32, value: impl Into<FixValue>) -> Self {
        self.fields.insert(tag, value.into());
        self
    }

    /// Add several fields in order
    pub fn with_fields<I, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<FixValue>,
    {
        for (tag, value) in fields {
            self.fields.insert(tag, value.into());
        }
        self
    }

    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    pub fn get(&self, tag: u32) -> Option<&FixValue> {
        self.fields.get(&tag)
    }

    pub fn get_text(&self, tag: u32) -> Option<String> {
        self.get(tag).map(|v| v.to_string())
    }

    pub fn get_u64(&self, tag: u32) -> Option<u64> {
        self.get(tag).and_then(FixValue::as_u64)
    }

    pub fn get_bool(&self, tag: u32) -> bool {
        self.get(tag).and_then(FixValue::as_bool).unwrap_or(false)
    }

    /// MsgSeqNum (tag 34), present on decoded messages
    pub fn seq_num(&self) -> Option<u64> {
        self.get_u64(tags::MSG_SEQ_NUM)
    }

    /// Fields in insertion (wire) order
    pub fn fields(&self) -> impl Iterator<Item = (u32, &FixValue)> {
        self.fields.iter().map(|(tag, value)| (*tag, value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Exact wire text this message was decoded from, if any
    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    // ------------------------------------------------------------------
    // Session-level messages
    // ------------------------------------------------------------------

    pub fn logon(heartbeat_interval_secs: u64, reset_seq_num: bool) -> Self {
        let msg = FixMessage::new(MsgType::Logon)
            .with_field(tags::ENCRYPT_METHOD, 0i64)
            .with_field(tags::HEART_BT_INT, heartbeat_interval_secs);
        if reset_seq_num {
            msg.with_field(tags::RESET_SEQ_NUM_FLAG, true)
        } else {
            msg
        }
    }

    pub fn logout(text: Option<&str>) -> Self {
        let msg = FixMessage::new(MsgType::Logout);
        match text {
            Some(text) => msg.with_field(tags::TEXT, text),
            None => msg,
        }
    }

    pub fn heartbeat(test_req_id: Option<&str>) -> Self {
        let msg = FixMessage::new(MsgType::Heartbeat);
        match test_req_id {
            Some(id) => msg.with_field(tags::TEST_REQ_ID, id),
            None => msg,
        }
    }

    pub fn test_request(test_req_id: &str) -> Self {
        FixMessage::new(MsgType::TestRequest).with_field(tags::TEST_REQ_ID, test_req_id)
    }

    pub fn resend_request(begin_seq: u64, end_seq: u64) -> Self {
        FixMessage::new(MsgType::ResendRequest)
            .with_field(tags::BEGIN_SEQ_NO, begin_seq)
            .with_field(tags::END_SEQ_NO, end_seq)
    }

    /// SequenceReset; gap-fill form also flags the message as a possible duplicate
    pub fn sequence_reset(new_seq_no: u64, gap_fill: bool) -> Self {
        let msg = FixMessage::new(MsgType::SequenceReset);
        let msg = if gap_fill {
            msg.with_field(tags::POSS_DUP_FLAG, true)
                .with_field(tags::GAP_FILL_FLAG, true)
        } else {
            msg
        };
        msg.with_field(tags::NEW_SEQ_NO, new_seq_no)
    }

    // ------------------------------------------------------------------
    // Application requests
    // ------------------------------------------------------------------

    pub fn new_order_single<I, V>(cl_ord_id: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<FixValue>,
    {
        FixMessage::new(MsgType::NewOrderSingle)
            .with_field(tags::CL_ORD_ID, cl_ord_id)
            .with_fields(fields)
    }

    pub fn order_cancel_request<I, V>(cl_ord_id: &str, orig_cl_ord_id: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<FixValue>,
    {
        FixMessage::new(MsgType::OrderCancelRequest)
            .with_field(tags::ORIG_CL_ORD_ID, orig_cl_ord_id)
            .with_field(tags::CL_ORD_ID, cl_ord_id)
            .with_fields(fields)
    }

    pub fn order_cancel_replace_request<I, V>(
        cl_ord_id: &str,
        orig_cl_ord_id: &str,
        fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<FixValue>,
    {
        FixMessage::new(MsgType::OrderCancelReplaceRequest)
            .with_field(tags::ORIG_CL_ORD_ID, orig_cl_ord_id)
            .with_field(tags::CL_ORD_ID, cl_ord_id)
            .with_fields(fields)
    }

    pub fn order_status_request<I, V>(cl_ord_id: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (u32, V)>,
        V: Into<FixValue>,
    {
        FixMessage::new(MsgType::OrderStatusRequest)
            .with_field(tags::CL_ORD_ID, cl_ord_id)
            .with_fields(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_value_parsing_is_canonical() {
        assert_eq!(FixValue::parse("42"), FixValue::Int(42));
        assert_eq!(FixValue::parse("-7"), FixValue::Int(-7));
        assert_eq!(FixValue::parse("1.50"), FixValue::Decimal(dec!(1.50)));
        assert_eq!(FixValue::parse("007"), FixValue::Text("007".into()));
        assert_eq!(FixValue::parse("+1"), FixValue::Text("+1".into()));
        assert_eq!(FixValue::parse("BTC-USD"), FixValue::Text("BTC-USD".into()));
        assert_eq!(
            FixValue::parse("20240101-12:00:00"),
            FixValue::Text("20240101-12:00:00".into())
        );
    }

    #[test]
    fn test_value_display_matches_wire() {
        for raw in ["0", "123", "1.50", "0.00010", "abc", "007", "Y"] {
            assert_eq!(FixValue::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_bool_values() {
        assert_eq!(FixValue::from(true).as_bool(), Some(true));
        assert_eq!(FixValue::from(false).as_bool(), Some(false));
        assert_eq!(FixValue::Int(1).as_bool(), None);
    }

    #[test]
    fn test_builder_keeps_insertion_order() {
        let msg = FixMessage::new_order_single(
            "ORD-1",
            [
                (tags::SYMBOL, FixValue::from("BTC-USD")),
                (tags::SIDE, FixValue::from(1i64)),
                (tags::PRICE, FixValue::from(dec!(50000.5))),
            ],
        );
        let order: Vec<u32> = msg.fields().map(|(t, _)| t).collect();
        assert_eq!(order, vec![tags::CL_ORD_ID, tags::SYMBOL, tags::SIDE, tags::PRICE]);
        assert_eq!(msg.msg_type(), MsgType::NewOrderSingle);
        assert!(msg.raw().is_none());
    }

    #[test]
    fn test_gap_fill_sequence_reset_fields() {
        let msg = FixMessage::sequence_reset(17, true);
        assert!(msg.get_bool(tags::GAP_FILL_FLAG));
        assert!(msg.get_bool(tags::POSS_DUP_FLAG));
        assert_eq!(msg.get_u64(tags::NEW_SEQ_NO), Some(17));

        let hard = FixMessage::sequence_reset(1, false);
        assert!(!hard.get_bool(tags::GAP_FILL_FLAG));
    }

    #[test]
    fn test_logon_reset_flag() {
        assert!(FixMessage::logon(30, true).get_bool(tags::RESET_SEQ_NUM_FLAG));
        assert!(FixMessage::logon(30, false).get(tags::RESET_SEQ_NUM_FLAG).is_none());
        assert_eq!(FixMessage::logon(30, false).get_u64(tags::HEART_BT_INT), Some(30));
    }
}
