//! Catalog HTTP Protocol
//!
//! Endpoints and Data Transfer Objects for reading the catalog directly.

use super::types::{CardRecord, PartitionKey};
use serde::{Deserialize, Serialize};

// --- API Endpoints ---

/// Point lookup: `/cards/{partition}/{sort_key}`.
pub const ENDPOINT_GET_CARD: &str = "/cards/:partition/:sort_key";
/// Record count of every partition.
pub const ENDPOINT_PARTITIONS: &str = "/cards/partitions";

// --- Data Transfer Objects ---

#[derive(Debug, Serialize, Deserialize)]
pub struct GetCardResponse {
    pub found: bool,
    pub record: Option<CardRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionCount {
    pub partition: PartitionKey,
    pub records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PartitionCountsResponse {
    pub total: usize,
    pub partitions: Vec<PartitionCount>,
}
