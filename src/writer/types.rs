use crate::catalog::types::StoreError;
use crate::queue::MessageId;

use serde::Serialize;
use std::time::Duration;

/// A message whose upsert failed in this delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedMessage {
    pub message_id: MessageId,
    pub card_id: String,
    pub delivery_count: u32,
    pub error: StoreError,
}

/// Outcome of writing one received batch.
///
/// Every message of the batch lands in exactly one of the four lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Written, or already stored unchanged.
    pub succeeded: Vec<MessageId>,
    /// Rejected by the monotonic-write guard; a newer version is already stored.
    pub stale: Vec<MessageId>,
    /// Left on the queue for redelivery.
    pub failed: Vec<FailedMessage>,
    /// Failed on their last allowed delivery.
    pub dead_lettered: Vec<FailedMessage>,
}

impl BatchResult {
    /// Messages that need no further delivery and can be deleted from the queue.
    pub fn processed_ids(&self) -> Vec<MessageId> {
        self.succeeded
            .iter()
            .chain(self.stale.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.stale.len() + self.failed.len() + self.dead_lettered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running totals across batches.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct WriteTotals {
    pub batches: u64,
    pub succeeded: u64,
    pub stale: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

impl WriteTotals {
    pub fn absorb(&mut self, result: &BatchResult) {
        self.batches += 1;
        self.succeeded += result.succeeded.len() as u64;
        self.stale += result.stale.len() as u64;
        self.failed += result.failed.len() as u64;
        self.dead_lettered += result.dead_lettered.len() as u64;
    }
}

/// What a `drain` call processed.
pub type DrainReport = WriteTotals;

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Maximum messages per batch (`B`).
    pub batch_size: usize,
    /// How long a receive waits for a batch to fill (`W`).
    pub batching_window: Duration,
    /// Batches processed at the same time (`C`).
    pub max_concurrency: usize,
    /// Deliveries after which a still failing message is dead-lettered.
    pub max_deliveries: u32,
    /// How often in-flight messages get their visibility extended while being written.
    pub visibility_extension_interval: Duration,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batching_window: Duration::from_secs(10),
            max_concurrency: 4,
            max_deliveries: 5,
            visibility_extension_interval: Duration::from_secs(10),
        }
    }
}
