use super::types::{BatchResult, FailedMessage};
use crate::catalog::store::CatalogStore;
use crate::catalog::types::PutOutcome;
use crate::queue::ImportMessage;

use std::sync::Arc;

/// Upserts queued cards into the catalog, one message at a time.
///
/// Failures are isolated per message: one throttled write never fails its neighbours.
pub struct BatchWriter {
    store: Arc<dyn CatalogStore>,
    max_deliveries: u32,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn CatalogStore>, max_deliveries: u32) -> Self {
        Self {
            store,
            max_deliveries,
        }
    }

    pub fn max_deliveries(&self) -> u32 {
        self.max_deliveries
    }

    pub async fn write_batch(&self, batch: &[ImportMessage]) -> BatchResult {
        let mut result = BatchResult::default();

        for message in batch {
            match self.store.put(message.record.clone()).await {
                Ok(PutOutcome::Written) | Ok(PutOutcome::Unchanged) => {
                    result.succeeded.push(message.message_id.clone());
                }
                Ok(PutOutcome::Stale { stored_updated_at }) => {
                    tracing::info!(
                        "Skipping stale update for {}/{}: incoming {} is older than stored {}",
                        message.record.partition_key,
                        message.record.sort_key,
                        message.record.updated_at,
                        stored_updated_at
                    );
                    result.stale.push(message.message_id.clone());
                }
                Err(error) => {
                    let failure = FailedMessage {
                        message_id: message.message_id.clone(),
                        card_id: message.record.card_id.clone(),
                        delivery_count: message.delivery_count,
                        error,
                    };

                    if message.delivery_count >= self.max_deliveries {
                        result.dead_lettered.push(failure);
                    } else {
                        tracing::warn!(
                            "Write failed for card {} (delivery {}/{}): {}",
                            failure.card_id,
                            failure.delivery_count,
                            self.max_deliveries,
                            failure.error
                        );
                        result.failed.push(failure);
                    }
                }
            }
        }

        result
    }
}
