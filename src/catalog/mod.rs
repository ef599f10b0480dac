//! Card Catalog Store Module
//!
//! Implements the partitioned key-value store that holds normalized card records.
//!
//! ## Core Concepts
//! - **Partitioning**: Records live in one of 27 fixed partitions: the first letter of the
//!   folded card name (`a`..`z`) or the sentinel partition `#`.
//! - **Ordering**: Inside a partition records are kept in sort-key order, so a range scan
//!   returns them ascending. The query engine relies on this for a deterministic merge.
//! - **Monotonic writes**: `put` only replaces a record when the incoming `updated_at` is not
//!   older than the stored one. Redelivered or reordered writes are therefore harmless.
//!
//! ## Submodules
//! - **`partitioner`**: The fixed partition set and the name -> partition mapping.
//! - **`store`**: The `CatalogStore` trait used by the writer and the query engine.
//! - **`memory`**: `InMemoryCatalog`, the ordered in-memory implementation.
//! - **`handlers`** / **`protocol`**: HTTP point lookup and partition statistics.

pub mod handlers;
pub mod memory;
pub mod partitioner;
pub mod protocol;
pub mod store;
pub mod types;
