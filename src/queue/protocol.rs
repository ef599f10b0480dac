//! Queue HTTP Protocol
//!
//! Read-only operational endpoints for watching the import backlog.

use super::types::{DeadLetter, QueueStats};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Visible, in-flight and dead-lettered message counts.
pub const ENDPOINT_QUEUE_STATS: &str = "/queue/stats";
/// Messages parked after exhausting their delivery budget.
pub const ENDPOINT_DEAD_LETTERS: &str = "/queue/dead-letters";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    #[serde(flatten)]
    pub stats: QueueStats,
    pub pending: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeadLettersResponse {
    pub count: usize,
    pub dead_letters: Vec<DeadLetter>,
}
