use crate::catalog::types::{CardRecord, PartitionKey, StoreError};

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Which partitions a query is sent to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Name search: a query with a letter only scans that letter's partition.
    #[default]
    Name,
    /// Substring search over every partition.
    Anywhere,
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query_text: String,
    pub limit: Option<usize>,
    pub continuation_token: Option<String>,
    /// Defaults to the token's mode when continuing, `Name` otherwise.
    pub mode: Option<MatchMode>,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.continuation_token = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub results: Vec<CardRecord>,
    pub continuation_token: Option<String>,
    /// At least one partition failed or timed out; its results are missing from this page.
    pub partial: bool,
    pub failed_partitions: Vec<PartitionKey>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("failed to encode continuation token: {0}")]
    TokenEncoding(#[from] serde_json::Error),
}

/// Why a single partition contributed nothing to a page.
#[derive(Debug, Clone, Error)]
pub enum PartitionFailure {
    #[error("scan of partition '{partition}' failed: {error}")]
    Store {
        partition: PartitionKey,
        error: StoreError,
    },
    #[error("scan of partition '{partition}' timed out after {timeout:?}")]
    TimedOut {
        partition: PartitionKey,
        timeout: Duration,
    },
    #[error("scan of partition '{partition}' aborted: {reason}")]
    Aborted {
        partition: PartitionKey,
        reason: String,
    },
}

impl PartitionFailure {
    pub fn partition(&self) -> &PartitionKey {
        match self {
            PartitionFailure::Store { partition, .. }
            | PartitionFailure::TimedOut { partition, .. }
            | PartitionFailure::Aborted { partition, .. } => partition,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub default_limit: usize,
    pub max_limit: usize,
    /// Upper bound on hits fetched from one partition per page.
    pub per_partition_cap: usize,
    pub partition_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
            per_partition_cap: 100,
            partition_timeout: Duration::from_secs(2),
        }
    }
}

// --- HTTP Data Transfer Objects ---

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub token: Option<String>,
    pub mode: Option<MatchMode>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub count: usize,
    pub results: Vec<CardRecord>,
    pub continuation_token: Option<String>,
    pub partial: bool,
    pub failed_partitions: Vec<PartitionKey>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchErrorResponse {
    pub error: String,
}
