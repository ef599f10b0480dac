//! Batch Consumer
//!
//! Bounded pool of workers that pull batches from the `ImportQueue` and hand them to the
//! `BatchWriter`.
//!
//! ## Responsibilities
//! - **Polling**: Each worker receives up to `batch_size` messages, waiting at most the
//!   batching window.
//! - **Visibility**: A sidecar task keeps the batch invisible while it is being written.
//! - **Acknowledgement**: Processed messages are deleted, exhausted ones dead-lettered and
//!   the rest left for redelivery.
//! - **Shutdown**: Workers stop between batches once the shutdown signal flips.

use super::batch::BatchWriter;
use super::types::*;
use crate::queue::{ImportMessage, ImportQueue, MessageId};

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct BatchConsumer {
    queue: Arc<ImportQueue>,
    writer: BatchWriter,
    settings: ConsumerSettings,
    totals: Mutex<WriteTotals>,
}

impl BatchConsumer {
    pub fn new(
        queue: Arc<ImportQueue>,
        writer: BatchWriter,
        settings: ConsumerSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            writer,
            settings,
            totals: Mutex::new(WriteTotals::default()),
        })
    }

    pub fn settings(&self) -> &ConsumerSettings {
        &self.settings
    }

    /// Totals across every batch this consumer has processed.
    pub fn totals(&self) -> WriteTotals {
        *self
            .totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawns `max_concurrency` workers and returns their handles.
    ///
    /// Workers run until `shutdown` turns `true` or its sender is dropped.
    pub fn start(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            "Starting {} batch workers (batch size {}, window {:?})",
            self.settings.max_concurrency,
            self.settings.batch_size,
            self.settings.batching_window
        );

        (0..self.settings.max_concurrency)
            .map(|worker_id| {
                let consumer = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    consumer.worker_loop(worker_id, shutdown).await;
                })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: usize, shutdown: watch::Receiver<bool>) {
        tracing::info!("Batch worker {} started", worker_id);

        // Shutdown is only observed between batches. Interrupting a receive would drop
        // messages it already claimed and charge them a delivery.
        while !shutdown_requested(&shutdown) {
            let batch = self
                .queue
                .receive_batch(self.settings.batch_size, self.settings.batching_window)
                .await;
            if batch.is_empty() {
                continue;
            }

            tracing::debug!("Worker {} received {} messages", worker_id, batch.len());
            self.process_batch(batch).await;
        }

        tracing::info!("Batch worker {} stopped", worker_id);
    }

    /// Receives and processes a single batch. `None` if nothing arrived within the window.
    pub async fn process_next_batch(&self) -> Option<BatchResult> {
        let batch = self
            .queue
            .receive_batch(self.settings.batch_size, self.settings.batching_window)
            .await;
        if batch.is_empty() {
            return None;
        }
        Some(self.process_batch(batch).await)
    }

    /// Processes batches until the queue holds neither visible nor in-flight messages.
    ///
    /// Failed messages are retried on redelivery until they succeed or get dead-lettered,
    /// so this only returns once every message reached a final state.
    pub async fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        while !self.queue.is_empty() {
            if let Some(result) = self.process_next_batch().await {
                report.absorb(&result);
            }
        }
        tracing::info!(
            "Drained queue: {} batches, {} written, {} stale, {} dead-lettered",
            report.batches,
            report.succeeded,
            report.stale,
            report.dead_lettered
        );
        report
    }

    async fn process_batch(&self, batch: Vec<ImportMessage>) -> BatchResult {
        let ids: Vec<MessageId> = batch.iter().map(|m| m.message_id.clone()).collect();

        let extension_handle = self.spawn_visibility_extension(ids);
        let result = self.writer.write_batch(&batch).await;
        extension_handle.abort();

        self.acknowledge(&result);

        self.totals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .absorb(&result);

        if !result.failed.is_empty() {
            tracing::warn!(
                "Batch of {} finished with {} failures left for redelivery",
                result.len(),
                result.failed.len()
            );
        }
        result
    }

    fn acknowledge(&self, result: &BatchResult) {
        let processed = result.processed_ids();
        if !processed.is_empty()
            && let Err(e) = self.queue.delete(&processed)
        {
            // The messages come back after the visibility timeout and hit the guard again
            tracing::error!("Failed to delete {} processed messages: {}", processed.len(), e);
        }

        for failure in result.dead_lettered.iter() {
            let reason = format!(
                "{} after {} deliveries",
                failure.error, failure.delivery_count
            );
            if let Err(e) = self.queue.dead_letter(&failure.message_id, &reason) {
                tracing::error!("Failed to dead-letter message {}: {}", failure.message_id, e);
            }
        }
    }

    /// Periodically extends the visibility of an in-flight batch.
    ///
    /// Stops on its own once none of the messages is in flight any more.
    fn spawn_visibility_extension(&self, ids: Vec<MessageId>) -> JoinHandle<()> {
        let queue = self.queue.clone();
        let interval = self.settings.visibility_extension_interval;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let extended = ids
                    .iter()
                    .filter(|id| queue.extend_visibility(id).is_ok())
                    .count();
                if extended == 0 {
                    break;
                }
                tracing::trace!("Extended visibility of {} messages", extended);
            }
        })
    }
}

/// True once shutdown was signalled or its sender is gone.
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
