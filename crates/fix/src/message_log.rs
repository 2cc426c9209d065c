//! Bounded in-memory log of sent and received wire messages

use conduit_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

use crate::tags::MsgType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone)]
pub struct MessageLogEntry {
    pub id: Uuid,
    pub session_id: String,
    pub direction: Direction,
    pub msg_type: MsgType,
    pub seq_num: u64,
    pub raw: String,
    pub timestamp: Timestamp,
}

/// Filter for [`MessageLog::query`]; all criteria are optional
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub direction: Option<Direction>,
    pub msg_type: Option<MsgType>,
    /// Return at most this many entries (the most recent ones)
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn msg_type(mut self, msg_type: MsgType) -> Self {
        self.msg_type = Some(msg_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, entry: &MessageLogEntry) -> bool {
        self.direction.is_none_or(|d| d == entry.direction)
            && self.msg_type.is_none_or(|t| t == entry.msg_type)
    }
}

/// Append-only ring buffer; the oldest entry is evicted when full
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<MessageLogEntry>,
    capacity: usize,
}

impl MessageLog {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1_024)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, entry: MessageLogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Matching entries in chronological order
    pub fn query(&self, query: &LogQuery) -> Vec<MessageLogEntry> {
        let mut matched: Vec<MessageLogEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        matched.reverse();
        matched
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
