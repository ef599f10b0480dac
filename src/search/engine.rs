//! Shard Fan-out Query Engine
//!
//! Runs one `scan_matches` per candidate partition in parallel and merges the pages into a
//! single ranked page.
//!
//! ## Responsibilities
//! - **Validation**: Rejects empty queries and foreign continuation tokens, clamps `limit`.
//! - **Fan-out**: Spawns the partition scans concurrently, each under its own timeout.
//! - **Degradation**: Failed or slow partitions are left out and reported as `partial`.
//! - **Pagination**: Encodes where every unexhausted partition continues.

use super::merge::{PartitionHits, merge_pages};
use super::token::{ContinuationToken, PartitionCursor};
use super::types::*;
use crate::catalog::partitioner::{all_partitions, first_letter, partition_index};
use crate::catalog::store::CatalogStore;
use crate::catalog::types::{MatchQuery, PartitionKey};
use crate::normalizer::fold_name;

use futures::future::join_all;
use std::sync::Arc;

pub struct QueryEngine {
    store: Arc<dyn CatalogStore>,
    settings: SearchSettings,
}

/// Partitions that can hold matches for a folded query.
pub fn candidate_partitions(needle: &str, mode: MatchMode) -> Vec<PartitionKey> {
    match (mode, first_letter(needle)) {
        (MatchMode::Name, Some(letter)) => vec![PartitionKey(letter.to_string())],
        _ => all_partitions(),
    }
}

impl QueryEngine {
    pub fn new(store: Arc<dyn CatalogStore>, settings: SearchSettings) -> Self {
        Self { store, settings }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResult, SearchError> {
        let needle = fold_name(&request.query_text);
        if needle.is_empty() {
            return Err(SearchError::InvalidQuery("query text is empty".to_string()));
        }

        let limit = request
            .limit
            .unwrap_or(self.settings.default_limit)
            .clamp(1, self.settings.max_limit);

        let (mode, cursors) = match request.continuation_token.as_deref() {
            Some(raw) => {
                let token = ContinuationToken::decode(raw)?;
                let mode = request.mode.unwrap_or(token.mode);
                if token.query != needle || token.mode != mode {
                    return Err(SearchError::InvalidQuery(
                        "continuation token belongs to a different query".to_string(),
                    ));
                }
                (mode, token.cursors)
            }
            None => {
                let mode = request.mode.unwrap_or_default();
                let cursors = candidate_partitions(&needle, mode)
                    .into_iter()
                    .map(|partition| PartitionCursor {
                        partition,
                        offset: 0,
                    })
                    .collect();
                (mode, cursors)
            }
        };

        let fetch = limit.min(self.settings.per_partition_cap);
        tracing::debug!(
            "Searching '{}' ({:?}) across {} partitions, limit {}",
            needle,
            mode,
            cursors.len(),
            limit
        );

        let outcomes = self.fan_out(&needle, &cursors, fetch).await;

        let mut pages = Vec::with_capacity(outcomes.len());
        let mut retry_cursors = Vec::new();
        let mut failed_partitions = Vec::new();
        for (outcome, cursor) in outcomes.into_iter().zip(cursors) {
            match outcome {
                Ok(hits) => pages.push(hits),
                Err(failure) => {
                    tracing::warn!("Search '{}': {}", needle, failure);
                    failed_partitions.push(failure.partition().clone());
                    retry_cursors.push(cursor);
                }
            }
        }

        let merged = merge_pages(pages, limit);

        let mut next_cursors = merged.cursors;
        next_cursors.extend(retry_cursors);
        next_cursors.sort_by_key(|cursor| partition_index(cursor.partition.as_str()));

        let continuation_token = if next_cursors.is_empty() {
            None
        } else {
            Some(
                ContinuationToken {
                    query: needle,
                    mode,
                    cursors: next_cursors,
                }
                .encode()?,
            )
        };

        Ok(SearchResult {
            results: merged.hits.into_iter().map(|hit| hit.record).collect(),
            continuation_token,
            partial: !failed_partitions.is_empty(),
            failed_partitions,
        })
    }

    /// Scans every cursor's partition concurrently. Outcomes come back in cursor order.
    async fn fan_out(
        &self,
        needle: &str,
        cursors: &[PartitionCursor],
        fetch: usize,
    ) -> Vec<Result<PartitionHits, PartitionFailure>> {
        let timeout = self.settings.partition_timeout;

        let handles: Vec<_> = cursors
            .iter()
            .map(|cursor| {
                let store = self.store.clone();
                let partition = cursor.partition.clone();
                let query = MatchQuery {
                    needle: needle.to_string(),
                    offset: cursor.offset,
                    limit: fetch,
                };

                tokio::spawn(async move {
                    match tokio::time::timeout(timeout, store.scan_matches(&partition, &query))
                        .await
                    {
                        Ok(Ok(page)) => Ok(PartitionHits {
                            partition,
                            offset: query.offset,
                            page,
                        }),
                        Ok(Err(error)) => Err(PartitionFailure::Store { partition, error }),
                        Err(_) => Err(PartitionFailure::TimedOut { partition, timeout }),
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(cursors)
            .map(|(joined, cursor)| {
                joined.unwrap_or_else(|e| {
                    Err(PartitionFailure::Aborted {
                        partition: cursor.partition.clone(),
                        reason: e.to_string(),
                    })
                })
            })
            .collect()
    }
}
