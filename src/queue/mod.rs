//! Import Queue Module
//!
//! A durable, at-least-once message channel that decouples the bulk fetcher from the
//! catalog writers.
//!
//! ## Delivery Model
//! 1. **Publish**: The fetcher enqueues one `ImportMessage` per normalized card. Failures are
//!    per message; the producer keeps going.
//! 2. **Receive**: A consumer asks for a batch of up to `B` messages and waits up to the
//!    batching window `W` for it to fill. Received messages become invisible for the
//!    visibility timeout and their delivery count goes up.
//! 3. **Acknowledge**: Written messages are deleted. Messages that keep failing are moved to
//!    the dead-letter set once they reach the delivery limit.
//! 4. **Redelivery**: Anything received but not deleted becomes visible again when its
//!    visibility timeout expires. Writers are idempotent, so duplicates are harmless.
//!
//! ## Submodules
//! - **`queue`**: `ImportQueue`, the in-process queue with visibility timeouts.
//! - **`journal`**: Append-only JSON-lines journal that makes the queue survive restarts.
//! - **`handlers`** / **`protocol`**: Operational HTTP endpoints (backlog and dead letters).
//! - **`types`**: Message envelope, settings, statistics and errors.

pub mod handlers;
pub mod journal;
pub mod protocol;
pub mod queue;
pub mod types;

pub use queue::ImportQueue;
pub use types::*;

use crate::catalog::types::CardRecord;
use async_trait::async_trait;

/// Producer side of the queue, as seen by the bulk fetcher.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(&self, record: CardRecord) -> Result<MessageId, QueueError>;
}

#[async_trait]
impl MessagePublisher for ImportQueue {
    async fn publish(&self, record: CardRecord) -> Result<MessageId, QueueError> {
        self.enqueue(record)
    }
}

#[cfg(test)]
mod tests;
