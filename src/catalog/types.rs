use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::normalizer::MatchRank;

/// Partition identifier: a single lowercase letter or the sentinel `#`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey(pub String);

impl PartitionKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A normalized card as stored in the catalog.
///
/// `attributes` carries the complete source record (set, prices, images, legality, ...).
/// The pipeline never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CardRecord {
    pub card_id: String,
    /// Display name, exactly as the source spelled it.
    pub name: String,
    /// Folded name used for matching.
    pub search_name: String,
    pub partition_key: PartitionKey,
    pub sort_key: String,
    pub updated_at: DateTime<Utc>,
    pub attributes: serde_json::Value,
}

/// Result of an upsert under the monotonic-write guard.
#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The record was inserted or replaced.
    Written,
    /// The identical record was already stored.
    Unchanged,
    /// The incoming record is older than the stored one and was rejected.
    Stale { stored_updated_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("write capacity exhausted for partition '{partition}'")]
    Throttled { partition: PartitionKey },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unknown partition '{0}'")]
    UnknownPartition(String),
}

/// Window over the matches of a single partition.
#[derive(Debug, Clone)]
pub struct MatchQuery {
    /// Folded query text.
    pub needle: String,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCard {
    pub rank: MatchRank,
    pub record: CardRecord,
}

/// Matches of one partition, ordered by `(rank, sort_key)`.
#[derive(Debug, Clone, Default)]
pub struct PartitionPage {
    pub hits: Vec<ScoredCard>,
    /// No further matches exist after this window.
    pub exhausted: bool,
}
