//! Search Service Module
//!
//! Name search over the partitioned catalog.
//!
//! ## Overview
//! The catalog is split by the first letter of each card's folded name, so a query has to be
//! sent to every partition that may hold matches ("shard fan-out") and the per-partition
//! pages merged back into one ranked page.
//!
//! ## Responsibilities
//! - **Candidate selection**: In `Name` mode a query with a letter maps to exactly one
//!   partition. Letter-less queries and `Anywhere` mode fan out to all 27.
//! - **Ranking**: Prefix matches before substring matches, then sort-key order.
//! - **Degradation**: A failed or slow partition does not fail the query; the page is
//!   flagged `partial` and the partition stays in the continuation token.
//! - **Pagination**: Stateless continuation tokens carrying per-partition offsets.
//!
//! ## Submodules
//! - **`engine`**: `QueryEngine`, fan-out and result assembly.
//! - **`merge`**: K-way merge of partition pages.
//! - **`token`**: Continuation token encoding.
//! - **`handlers`**: HTTP handler for the Axum web server.
//! - **`types`**: Requests, results, errors and DTOs.

pub mod engine;
pub mod handlers;
pub mod merge;
pub mod token;
pub mod types;

pub use engine::QueryEngine;
pub use types::*;
