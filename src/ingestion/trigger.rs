//! Client side of the import trigger, used by external schedulers (cron, CI) through the
//! `trigger` subcommand.

use super::handlers::ENDPOINT_IMPORT;
use super::types::{
    ImportParams, ImportRunResponse, ImportRunStatus, TriggerImportRequest,
    TriggerImportResponse,
};

use anyhow::{Context, Result};
use std::time::Duration;

pub struct TriggerClient {
    http_client: reqwest::Client,
    server: String,
}

impl TriggerClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    /// Asks the server to start an import run and returns its id.
    pub async fn trigger(&self, params: ImportParams) -> Result<TriggerImportResponse> {
        let url = format!("{}{}", self.server, ENDPOINT_IMPORT);
        let payload = TriggerImportRequest {
            lookback_days: Some(params.lookback_days),
        };

        let response = self
            .post_with_retry(&url, &payload, Duration::from_secs(5), 3)
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Import trigger rejected: {}", response.status());
        }

        response
            .json::<TriggerImportResponse>()
            .await
            .context("Invalid trigger response")
    }

    pub async fn status(&self, run_id: &str) -> Result<Option<ImportRunStatus>> {
        let url = format!("{}{}/{}", self.server, ENDPOINT_IMPORT, run_id);
        let response = self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let body: ImportRunResponse = response.json().await.context("Invalid status response")?;
        Ok(body.status)
    }

    /// Polls a run until it completes or fails.
    pub async fn wait(&self, run_id: &str, poll_interval: Duration) -> Result<ImportRunStatus> {
        loop {
            match self.status(run_id).await? {
                Some(status) if status.is_finished() => return Ok(status),
                Some(_) => tokio::time::sleep(poll_interval).await,
                None => anyhow::bail!("Server does not know import run {}", run_id),
            }
        }
    }

    async fn post_with_retry<T: serde::Serialize>(
        &self,
        url: &str,
        payload: &T,
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .post(url)
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}
