//! Card Catalog Library
//!
//! This library crate defines the modules behind the `card-catalog` binary (`main.rs`).
//!
//! ## Architecture Modules
//! The system is a pipeline of loosely coupled stages plus a read path:
//!
//! - **`ingestion`**: Downloads the bulk card snapshot, keeps the records updated within the
//!   lookback window and publishes them to the import queue.
//! - **`normalizer`**: Turns a raw source record into a `CardRecord` (folded search name,
//!   partition key, sort key, timestamp).
//! - **`queue`**: The durable at-least-once channel between the fetcher and the writers.
//! - **`writer`**: Batch consumers that upsert queued records into the catalog and
//!   dead-letter the ones that keep failing.
//! - **`catalog`**: The partitioned, ordered store with monotonic (never older) writes.
//! - **`search`**: The query engine. Fans a name search out over the relevant partitions,
//!   merges the pages and hands out continuation tokens.
//! - **`config`** / **`app`**: Environment configuration and the HTTP wiring.

pub mod app;
pub mod catalog;
pub mod config;
pub mod ingestion;
pub mod normalizer;
pub mod queue;
pub mod search;
pub mod writer;

#[cfg(test)]
mod test_support;
