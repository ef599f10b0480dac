use super::partitioner::{PARTITION_COUNT, PARTITION_KEYS, partition_index};
use super::store::CatalogStore;
use super::types::*;
use crate::normalizer::{MatchRank, match_rank};

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::{RwLock, Semaphore};

/// In-memory catalog: one ordered map per fixed partition.
///
/// Writers to the same partition serialize on that partition's lock, which is what makes
/// the monotonic-write guard race free. Writers to different partitions never contend.
pub struct InMemoryCatalog {
    partitions: Vec<RwLock<BTreeMap<String, CardRecord>>>,
    /// Caps concurrent writes; a write that finds no free slot is throttled.
    write_capacity: Option<Semaphore>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            partitions: (0..PARTITION_COUNT)
                .map(|_| RwLock::new(BTreeMap::new()))
                .collect(),
            write_capacity: None,
        }
    }

    /// Limits the number of writes that may be in progress at once.
    pub fn with_write_capacity(mut self, max_concurrent_writes: usize) -> Self {
        self.write_capacity = Some(Semaphore::new(max_concurrent_writes));
        self
    }

    fn partition(
        &self,
        key: &PartitionKey,
    ) -> Result<&RwLock<BTreeMap<String, CardRecord>>, StoreError> {
        partition_index(key.as_str())
            .map(|idx| &self.partitions[idx])
            .ok_or_else(|| StoreError::UnknownPartition(key.0.clone()))
    }

    /// Number of records per partition, in `PARTITION_KEYS` order.
    pub async fn partition_counts(&self) -> Vec<(PartitionKey, usize)> {
        let mut counts = Vec::with_capacity(PARTITION_COUNT);
        for (key, partition) in PARTITION_KEYS.iter().zip(self.partitions.iter()) {
            counts.push((PartitionKey(key.to_string()), partition.read().await.len()));
        }
        counts
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for partition in self.partitions.iter() {
            total += partition.read().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn put(&self, record: CardRecord) -> Result<PutOutcome, StoreError> {
        let _permit = match &self.write_capacity {
            Some(capacity) => Some(capacity.try_acquire().map_err(|_| StoreError::Throttled {
                partition: record.partition_key.clone(),
            })?),
            None => None,
        };

        let partition = self.partition(&record.partition_key)?;
        let mut map = partition.write().await;

        if let Some(stored) = map.get(&record.sort_key) {
            if record.updated_at < stored.updated_at {
                tracing::debug!(
                    "PUT: stale write for {}/{} ({} < {})",
                    record.partition_key,
                    record.sort_key,
                    record.updated_at,
                    stored.updated_at
                );
                return Ok(PutOutcome::Stale {
                    stored_updated_at: stored.updated_at,
                });
            }
            if *stored == record {
                return Ok(PutOutcome::Unchanged);
            }
        }

        tracing::trace!("PUT: {}/{}", record.partition_key, record.sort_key);
        map.insert(record.sort_key.clone(), record);
        Ok(PutOutcome::Written)
    }

    async fn get(
        &self,
        partition: &PartitionKey,
        sort_key: &str,
    ) -> Result<Option<CardRecord>, StoreError> {
        let map = self.partition(partition)?.read().await;
        Ok(map.get(sort_key).cloned())
    }

    async fn scan(
        &self,
        partition: &PartitionKey,
        sort_key_prefix: &str,
    ) -> Result<Vec<CardRecord>, StoreError> {
        let map = self.partition(partition)?.read().await;
        Ok(map
            .range(sort_key_prefix.to_string()..)
            .take_while(|(sort_key, _)| sort_key.starts_with(sort_key_prefix))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn scan_matches(
        &self,
        partition: &PartitionKey,
        query: &MatchQuery,
    ) -> Result<PartitionPage, StoreError> {
        let map = self.partition(partition)?.read().await;

        let mut prefix_hits = Vec::new();
        let mut substring_hits = Vec::new();
        for record in map.values() {
            match match_rank(&record.search_name, &query.needle) {
                Some(MatchRank::Prefix) => prefix_hits.push(record),
                Some(MatchRank::Substring) => substring_hits.push(record),
                None => {}
            }
        }

        let total = prefix_hits.len() + substring_hits.len();
        let hits = prefix_hits
            .into_iter()
            .map(|record| (MatchRank::Prefix, record))
            .chain(
                substring_hits
                    .into_iter()
                    .map(|record| (MatchRank::Substring, record)),
            )
            .skip(query.offset)
            .take(query.limit)
            .map(|(rank, record)| ScoredCard {
                rank,
                record: record.clone(),
            })
            .collect();

        Ok(PartitionPage {
            hits,
            exhausted: query.offset.saturating_add(query.limit) >= total,
        })
    }

    async fn partition_len(&self, partition: &PartitionKey) -> Result<usize, StoreError> {
        Ok(self.partition(partition)?.read().await.len())
    }
}
