//! Batch Writer Module
//!
//! Consumes the import queue and upserts each card into the catalog.
//!
//! ## Processing Model
//! 1. **Receive**: A worker takes a batch of up to `B` messages from the queue.
//! 2. **Write**: Each message is upserted on its own. The catalog's monotonic guard turns
//!    redelivered or out-of-order messages into harmless `Stale` outcomes.
//! 3. **Acknowledge**: Written and stale messages are deleted. Failed ones stay on the
//!    queue and are redelivered, unless they just used their last delivery, in which case
//!    they are dead-lettered.
//!
//! At most `C` batches are written at the same time; workers share nothing but the store.
//!
//! ## Submodules
//! - **`batch`**: `BatchWriter`, per-message upsert with failure isolation.
//! - **`consumer`**: `BatchConsumer`, the bounded worker pool around the queue.

pub mod batch;
pub mod consumer;
pub mod types;

pub use batch::BatchWriter;
pub use consumer::BatchConsumer;
pub use types::*;
