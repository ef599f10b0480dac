use crate::catalog::types::CardRecord;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Unique identifier of a queued message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue envelope around one normalized card.
///
/// Serialized flat: `{message_id, card_id, partition_key, sort_key, attributes, updated_at,
/// delivery_count, ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportMessage {
    pub message_id: MessageId,
    #[serde(flatten)]
    pub record: CardRecord,
    /// Number of times the message has been handed to a consumer.
    pub delivery_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MessageState {
    /// Can be received.
    Visible,
    /// Handed to a consumer; hidden until `visible_at`.
    InFlight { visible_at: Instant },
}

/// Internal bookkeeping for a message that has not been deleted yet.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub message: ImportMessage,
    /// Publish order; receives are served oldest first.
    pub seq: u64,
    pub state: MessageState,
}

impl QueueEntry {
    pub fn is_receivable(&self, now: Instant) -> bool {
        match self.state {
            MessageState::Visible => true,
            MessageState::InFlight { visible_at } => now >= visible_at,
        }
    }
}

/// A message that exhausted its delivery budget. Kept for manual inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetter {
    pub message: ImportMessage,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub visibility_timeout: Duration,
    /// Publishing fails once this many messages are waiting or in flight.
    pub max_depth: Option<usize>,
    /// The journal is rewritten once it holds at least this many lines and more than
    /// twice as many as there are surviving messages.
    pub journal_compaction_min_lines: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            max_depth: None,
            journal_compaction_min_lines: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub visible: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full ({max_depth} messages)")]
    Full { max_depth: usize },
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("journal write failed: {0}")]
    Journal(#[from] std::io::Error),
    #[error("journal encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}
