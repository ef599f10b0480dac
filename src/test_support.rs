//! Shared fixtures for unit tests.

use crate::catalog::memory::InMemoryCatalog;
use crate::catalog::store::CatalogStore;
use crate::catalog::types::{
    CardRecord, MatchQuery, PartitionKey, PartitionPage, PutOutcome, StoreError,
};
use crate::normalizer::{RawCard, normalize};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

/// Fixed reference instant so tests never depend on the wall clock.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

pub fn minutes_after_base(minutes: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::minutes(minutes)
}

/// Raw bulk-data object as the source would send it.
pub fn raw_card_json(
    id: &str,
    name: &str,
    set: &str,
    collector_number: &str,
    updated_at: DateTime<Utc>,
) -> serde_json::Value {
    json!({
        "object": "card",
        "id": id,
        "name": name,
        "set": set,
        "collector_number": collector_number,
        "updated_at": updated_at.to_rfc3339(),
        "prices": { "usd": "0.25" }
    })
}

/// Normalized record built through the real normalizer.
pub fn card(
    id: &str,
    name: &str,
    set: &str,
    collector_number: &str,
    updated_at: DateTime<Utc>,
) -> CardRecord {
    let raw = RawCard::from_value(raw_card_json(id, name, set, collector_number, updated_at))
        .expect("fixture is an object");
    normalize(&raw).expect("fixture normalizes")
}

/// Catalog double that injects failures in front of a real `InMemoryCatalog`.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryCatalog,
    /// card_id -> remaining failing puts.
    put_failures: DashMap<String, u32>,
    failing_partitions: DashMap<String, ()>,
    slow_partitions: DashMap<String, Duration>,
    scanned: Mutex<Vec<PartitionKey>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` puts of `card_id` fail with `Throttled`.
    pub fn fail_puts(&self, card_id: &str, times: u32) {
        self.put_failures.insert(card_id.to_string(), times);
    }

    pub fn fail_partition(&self, partition: &str) {
        self.failing_partitions.insert(partition.to_string(), ());
    }

    pub fn restore_partition(&self, partition: &str) {
        self.failing_partitions.remove(partition);
        self.slow_partitions.remove(partition);
    }

    pub fn slow_partition(&self, partition: &str, delay: Duration) {
        self.slow_partitions.insert(partition.to_string(), delay);
    }

    pub fn inner(&self) -> &InMemoryCatalog {
        &self.inner
    }

    /// Partitions `scan_matches` was called for, in call order.
    pub fn scanned_partitions(&self) -> Vec<PartitionKey> {
        self.scanned.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for FaultyStore {
    async fn put(&self, record: CardRecord) -> Result<PutOutcome, StoreError> {
        if let Some(mut remaining) = self.put_failures.get_mut(&record.card_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StoreError::Throttled {
                partition: record.partition_key.clone(),
            });
        }
        self.inner.put(record).await
    }

    async fn get(
        &self,
        partition: &PartitionKey,
        sort_key: &str,
    ) -> Result<Option<CardRecord>, StoreError> {
        self.inner.get(partition, sort_key).await
    }

    async fn scan(
        &self,
        partition: &PartitionKey,
        sort_key_prefix: &str,
    ) -> Result<Vec<CardRecord>, StoreError> {
        self.inner.scan(partition, sort_key_prefix).await
    }

    async fn scan_matches(
        &self,
        partition: &PartitionKey,
        query: &MatchQuery,
    ) -> Result<PartitionPage, StoreError> {
        self.scanned.lock().unwrap().push(partition.clone());

        let delay = self.slow_partitions.get(partition.as_str()).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_partitions.contains_key(partition.as_str()) {
            return Err(StoreError::Unavailable(format!(
                "partition {partition} is offline"
            )));
        }
        self.inner.scan_matches(partition, query).await
    }

    async fn partition_len(&self, partition: &PartitionKey) -> Result<usize, StoreError> {
        self.inner.partition_len(partition).await
    }
}
