//! FIX tag=value wire codec
//!
//! Wire layout of an encoded message (`|` stands for the SOH delimiter):
//!
//! ```text
//! 8=FIX.4.4|9=<body len>|35=<type>|49=<sender>|56=<target>|34=<seq>|52=<time>|<fields...>|10=<sum>|
//! └──── header ────────┘└──────────────────────── body ───────────────────────────────┘└ trailer ┘
//! ```
//!
//! The body length counts the body bytes only; the checksum is the byte sum
//! of header + body modulo 256, rendered as three zero-padded digits.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::warn;
use std::fmt::{Display, Write};

use crate::error::{FixError, Result};
use crate::message::{FixMessage, FixValue};
use crate::tags::{self, FixVersion, MsgType};

/// Field delimiter (SOH)
pub const SOH: u8 = 0x01;

/// SendingTime format: `YYYYMMDD-HH:MM:SS`, UTC, no fractional seconds
pub const SENDING_TIME_FORMAT: &str = "%Y%m%d-%H:%M:%S";

/// `10=` + 3 digits + SOH
const TRAILER_LEN: usize = 7;

/// Frames larger than this without a trailer are treated as garbage
const MAX_BUFFERED_BYTES: usize = 1 << 20;

/// Standard header values stamped on every outbound message
#[derive(Debug, Clone)]
pub struct Header<'a> {
    pub version: FixVersion,
    pub sender_comp_id: &'a str,
    pub target_comp_id: &'a str,
    pub seq_num: u64,
    pub sending_time: DateTime<Utc>,
}

pub fn format_sending_time(time: &DateTime<Utc>) -> String {
    time.format(SENDING_TIME_FORMAT).to_string()
}

/// Sum of bytes modulo 256
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

fn push_field(buf: &mut String, tag: u32, value: impl Display) {
    // Writing into a String cannot fail
    let _ = write!(buf, "{}={}\u{1}", tag, value);
}

/// Serialize a message with the given header into wire text
///
/// Header and trailer tags present in the message's own field map are
/// ignored; the encoder always writes them itself.
pub fn encode(msg: &FixMessage, header: &Header<'_>) -> String {
    let mut body = String::with_capacity(128);
    push_field(&mut body, tags::MSG_TYPE, msg.msg_type().as_str());
    push_field(&mut body, tags::SENDER_COMP_ID, header.sender_comp_id);
    push_field(&mut body, tags::TARGET_COMP_ID, header.target_comp_id);
    push_field(&mut body, tags::MSG_SEQ_NUM, header.seq_num);
    push_field(
        &mut body,
        tags::SENDING_TIME,
        format_sending_time(&header.sending_time),
    );
    for (tag, value) in msg.fields() {
        if tags::HEADER_TAGS.contains(&tag) {
            continue;
        }
        push_field(&mut body, tag, value);
    }

    let mut out = String::with_capacity(body.len() + 32);
    push_field(&mut out, tags::BEGIN_STRING, header.version.begin_string());
    push_field(&mut out, tags::BODY_LENGTH, body.len());
    out.push_str(&body);
    let sum = checksum(out.as_bytes());
    push_field(&mut out, tags::CHECKSUM, format_args!("{:03}", sum));
    out
}

/// Parse one complete frame into a message
///
/// Tokens whose tag is not an integer are skipped. The message type must be
/// present and known.
pub fn decode(raw: &str) -> Result<FixMessage> {
    let mut fields = IndexMap::new();
    let mut msg_type = None;

    for token in raw.split(SOH as char).filter(|t| !t.is_empty()) {
        let Some((tag, value)) = token.split_once('=') else {
            continue;
        };
        let Ok(tag) = tag.trim().parse::<u32>() else {
            continue;
        };
        if tag == tags::MSG_TYPE {
            msg_type = Some(
                MsgType::from_wire(value)
                    .ok_or_else(|| FixError::Protocol(format!("unknown MsgType '{}'", value)))?,
            );
        }
        fields.insert(tag, FixValue::parse(value));
    }

    let msg_type = msg_type.ok_or_else(|| FixError::Protocol("missing MsgType (35)".into()))?;
    Ok(FixMessage::from_wire(msg_type, fields, raw.to_string()))
}

/// Check the trailing `10=` field against the bytes preceding it
pub fn verify_checksum(raw: &str) -> Result<()> {
    let bytes = raw.as_bytes();
    let start = find_trailer(bytes)
        .ok_or_else(|| FixError::Protocol("missing CheckSum (10)".into()))?;
    let digits = &raw[start + 3..start + 6];
    let declared: u16 = digits
        .parse()
        .map_err(|_| FixError::Protocol(format!("bad CheckSum '{}'", digits)))?;
    let computed = checksum(&bytes[..start]);
    if declared != u16::from(computed) {
        return Err(FixError::ChecksumMismatch {
            declared: declared.min(255) as u8,
            computed,
        });
    }
    Ok(())
}

fn is_trailer_at(bytes: &[u8], i: usize) -> bool {
    i + TRAILER_LEN <= bytes.len()
        && &bytes[i..i + 3] == b"10="
        && (i == 0 || bytes[i - 1] == SOH)
        && bytes[i + 3..i + 6].iter().all(u8::is_ascii_digit)
        && bytes[i + 6] == SOH
}

fn find_trailer(bytes: &[u8]) -> Option<usize> {
    (0..bytes.len()).rev().find(|&i| is_trailer_at(bytes, i))
}

/// Render wire text with `|` in place of SOH for logs
pub fn printable(raw: &str) -> String {
    raw.replace(SOH as char, "|")
}

/// Incremental frame splitter for inbound bytes
///
/// Bytes are appended with [`push`](FrameDecoder::push); each call to
/// [`next_frame`](FrameDecoder::next_frame) yields the next complete message
/// (everything up to and including `10=NNN<SOH>`) and keeps the remainder
/// buffered. A scan cursor avoids re-reading bytes already known not to
/// start a trailer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    cursor: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.buffer.len() + bytes.len() > MAX_BUFFERED_BYTES {
            warn!(
                "Dropping {} buffered bytes without a complete FIX frame",
                self.buffer.len()
            );
            self.clear();
        }
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_frame(&mut self) -> Option<String> {
        let mut i = self.cursor;
        while i + TRAILER_LEN <= self.buffer.len() {
            if is_trailer_at(&self.buffer, i) {
                let end = i + TRAILER_LEN;
                let frame: Vec<u8> = self.buffer.drain(..end).collect();
                self.cursor = 0;
                return Some(String::from_utf8_lossy(&frame).into_owned());
            }
            i += 1;
        }
        self.cursor = i;
        None
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }
}
