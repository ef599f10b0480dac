use async_trait::async_trait;

use super::types::{CardRecord, MatchQuery, PartitionKey, PartitionPage, PutOutcome, StoreError};

/// Access to the partitioned card catalog.
///
/// Implementations must keep `scan` and `scan_matches` ordered: the query engine merges
/// partition results assuming each one is already sorted.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Idempotent upsert keyed by `(partition_key, sort_key)`.
    ///
    /// A record older than the stored version is rejected with `PutOutcome::Stale`.
    async fn put(&self, record: CardRecord) -> Result<PutOutcome, StoreError>;

    async fn get(
        &self,
        partition: &PartitionKey,
        sort_key: &str,
    ) -> Result<Option<CardRecord>, StoreError>;

    /// Records whose sort key starts with `sort_key_prefix`, ascending by sort key.
    async fn scan(
        &self,
        partition: &PartitionKey,
        sort_key_prefix: &str,
    ) -> Result<Vec<CardRecord>, StoreError>;

    /// Prefix and substring matches of `query.needle`, ordered by `(rank, sort_key)`.
    async fn scan_matches(
        &self,
        partition: &PartitionKey,
        query: &MatchQuery,
    ) -> Result<PartitionPage, StoreError>;

    async fn partition_len(&self, partition: &PartitionKey) -> Result<usize, StoreError>;
}
