//! Bulk Fetcher
//!
//! Downloads the current bulk snapshot and publishes every recent card to the import queue.
//!
//! ## Responsibilities
//! - **Resolution**: Looks up the snapshot's `download_uri` in the bulk-data index, with
//!   retries.
//! - **Streaming**: Splits the body into array elements as chunks arrive; the snapshot is
//!   never held in memory as a whole.
//! - **Filtering**: Drops invalid records and records outside the recency window.
//! - **Publishing**: Hands each accepted record to the queue immediately. A failed publish
//!   is counted and the run goes on.

use super::json_stream::JsonArraySplitter;
use super::types::*;
use crate::normalizer::{RawCard, normalize};
use crate::queue::MessagePublisher;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;

pub struct BulkFetcher {
    http_client: reqwest::Client,
    settings: FetcherSettings,
    publisher: Arc<dyn MessagePublisher>,
}

impl BulkFetcher {
    pub fn new(settings: FetcherSettings, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            settings,
            publisher,
        }
    }

    pub fn settings(&self) -> &FetcherSettings {
        &self.settings
    }

    /// Runs one complete import.
    pub async fn run(&self, params: ImportParams) -> Result<ImportReport, FetchError> {
        let started_at = Utc::now();
        tracing::info!(
            "Starting bulk import (lookback {} days) from {}",
            params.lookback_days,
            self.settings.index_url
        );

        let index = self.resolve_snapshot().await?;
        tracing::info!(
            "Downloading snapshot {} (updated {}, {} bytes)",
            index.download_uri,
            index.updated_at.as_deref().unwrap_or("unknown"),
            index
                .size
                .map(|size| size.to_string())
                .unwrap_or_else(|| "?".to_string())
        );

        let read_timeout = self.settings.read_timeout;
        let request = self
            .http_client
            .get(&index.download_uri)
            .header(USER_AGENT, &self.settings.user_agent)
            .header(ACCEPT, "application/json")
            .send();
        let response = tokio::time::timeout(read_timeout, request)
            .await
            .map_err(|_| FetchError::Timeout {
                url: index.download_uri.clone(),
                idle: read_timeout,
            })??;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: index.download_uri,
                status: response.status().as_u16(),
            });
        }

        let body = with_idle_timeout(
            response.bytes_stream().map_err(FetchError::from),
            read_timeout,
            index.download_uri,
        );
        let report = import_stream(
            body,
            params,
            self.publisher.as_ref(),
            started_at,
            self.settings.progress_interval,
        )
        .await?;

        tracing::info!(
            "Bulk import finished: {} scanned, {} published, {} publish failures, {} outside window, {} invalid",
            report.scanned,
            report.published,
            report.publish_failures,
            report.skipped_outside_window,
            report.skipped_invalid
        );
        Ok(report)
    }

    async fn resolve_snapshot(&self) -> Result<BulkDataIndex, FetchError> {
        let url = self.settings.index_url.clone();
        let response = self
            .get_with_retry(&url, self.settings.index_timeout, self.settings.index_attempts)
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response
            .json::<BulkDataIndex>()
            .await
            .map_err(|e| FetchError::MalformedPayload(format!("bulk-data index: {e}")))
    }

    /// GET with exponential backoff and jitter. Transport errors and 5xx / 429 answers are
    /// retried; the last answer is returned as is.
    async fn get_with_retry(
        &self,
        url: &str,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response, FetchError> {
        let attempts = attempts.max(1);
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .get(url)
                .header(USER_AGENT, &self.settings.user_agent)
                .header(ACCEPT, "application/json")
                .timeout(timeout)
                .send()
                .await;

            let last_attempt = attempt + 1 == attempts;
            match response {
                Ok(resp) if last_attempt || !is_retryable(resp.status()) => return Ok(resp),
                Ok(resp) => {
                    tracing::warn!("GET {} answered {}, retrying", url, resp.status());
                }
                Err(e) if last_attempt => return Err(FetchError::Transport(e)),
                Err(e) => {
                    tracing::warn!("GET {} failed: {}, retrying", url, e);
                }
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(FetchError::MalformedPayload(format!(
            "no response from {url} after {attempts} attempts"
        )))
    }
}

/// Fails the stream with `FetchError::Timeout` when no chunk arrives within `idle`.
fn with_idle_timeout<S>(
    body: S,
    idle: Duration,
    url: String,
) -> impl Stream<Item = Result<Bytes, FetchError>>
where
    S: Stream<Item = Result<Bytes, FetchError>>,
{
    futures::stream::unfold(Some(Box::pin(body)), move |body| {
        let url = url.clone();
        async move {
            let Some(mut body) = body else {
                return None;
            };
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(chunk)) => Some((chunk, Some(body))),
                Ok(None) => None,
                // Ends the stream after reporting, the source is not polled again
                Err(_) => Some((Err(FetchError::Timeout { url, idle }), None)),
            }
        }
    })
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Splits, filters and publishes a snapshot body.
///
/// Records must have been updated within `[now - lookback_days, now]`. Fails on the first
/// transport or format error; records published until then stay published.
pub async fn import_stream<S>(
    body: S,
    params: ImportParams,
    publisher: &dyn MessagePublisher,
    now: DateTime<Utc>,
    progress_interval: u64,
) -> Result<ImportReport, FetchError>
where
    S: Stream<Item = Result<Bytes, FetchError>>,
{
    let window_start = now - chrono::Duration::days(i64::from(params.lookback_days));
    let mut report = ImportReport::new(now);
    let mut splitter = JsonArraySplitter::new();

    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for element in splitter.push(&chunk)? {
            report.scanned += 1;
            if progress_interval > 0 && report.scanned % progress_interval == 0 {
                tracing::info!(
                    "Import progress: {} scanned, {} published",
                    report.scanned,
                    report.published
                );
            }

            let value: serde_json::Value = serde_json::from_slice(&element).map_err(|e| {
                FetchError::MalformedPayload(format!("element {}: {}", report.scanned, e))
            })?;

            let record = match RawCard::from_value(value).map(|raw| normalize(&raw)) {
                Some(Ok(record)) => record,
                Some(Err(e)) => {
                    tracing::debug!("Skipping element {}: {}", report.scanned, e);
                    report.skipped_invalid += 1;
                    continue;
                }
                None => {
                    tracing::debug!("Skipping element {}: not an object", report.scanned);
                    report.skipped_invalid += 1;
                    continue;
                }
            };

            if record.updated_at < window_start || record.updated_at > now {
                report.skipped_outside_window += 1;
                continue;
            }

            let card_id = record.card_id.clone();
            match publisher.publish(record).await {
                Ok(_) => report.published += 1,
                Err(e) => {
                    tracing::warn!("Failed to publish card {}: {}", card_id, e);
                    report.publish_failures += 1;
                }
            }
        }
    }
    splitter.finish()?;

    report.finished_at = Some(Utc::now());
    Ok(report)
}
