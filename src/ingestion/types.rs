//! Ingestion Data Types
//!
//! Parameters, reports and errors of a bulk import run, plus the DTOs of the import
//! endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Explicit input of one import run. The weekly schedule and manual backfills both
/// construct one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportParams {
    /// Only records updated within this many days before the run are imported.
    pub lookback_days: u32,
}

impl Default for ImportParams {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// Aggregate outcome of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Array elements read from the snapshot.
    pub scanned: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub skipped_outside_window: u64,
    /// Valid JSON that is not a usable card (no id, name or timestamp).
    pub skipped_invalid: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ImportReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            scanned: 0,
            published: 0,
            publish_failures: 0,
            skipped_outside_window: 0,
            skipped_invalid: 0,
            started_at,
            finished_at: None,
        }
    }
}

/// Fatal failures of a run. Whatever was published before the failure stays published.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("{url} sent nothing for {idle:?}")]
    Timeout { url: String, idle: Duration },
}

#[derive(Debug, Clone)]
pub struct FetcherSettings {
    /// Bulk-data index entry whose `download_uri` points at the current snapshot.
    pub index_url: String,
    pub user_agent: String,
    /// Timeout of the index request.
    pub index_timeout: Duration,
    /// Longest silence tolerated from the snapshot download, both before the response
    /// headers and between body chunks. The download as a whole has no deadline.
    pub read_timeout: Duration,
    pub index_attempts: usize,
    /// Log progress every this many scanned elements.
    pub progress_interval: u64,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            index_url: "https://api.scryfall.com/bulk-data/default-cards".to_string(),
            user_agent: concat!("card-catalog/", env!("CARGO_PKG_VERSION")).to_string(),
            index_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
            index_attempts: 3,
            progress_interval: 10_000,
        }
    }
}

/// The subset of a bulk-data index entry the fetcher needs.
#[derive(Debug, Deserialize)]
pub struct BulkDataIndex {
    pub download_uri: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportRunStatus {
    Running {
        params: ImportParams,
        started_at: DateTime<Utc>,
    },
    Completed {
        report: ImportReport,
    },
    Failed {
        error: String,
        finished_at: DateTime<Utc>,
    },
}

impl ImportRunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ImportRunStatus::Running { .. })
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ImportRunStatus::Running { .. } => None,
            ImportRunStatus::Completed { report } => report.finished_at,
            ImportRunStatus::Failed { finished_at, .. } => Some(*finished_at),
        }
    }
}

// --- HTTP Data Transfer Objects ---

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TriggerImportRequest {
    pub lookback_days: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerImportResponse {
    pub run_id: String,
    pub lookback_days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportRunResponse {
    pub run_id: String,
    pub found: bool,
    pub status: Option<ImportRunStatus>,
}
