use super::fetcher::BulkFetcher;
use super::types::{ImportParams, ImportRunStatus};

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

/// Finished runs kept for status queries. Running runs are never evicted.
pub const DEFAULT_RUN_RETENTION: usize = 100;

/// Registry of import runs started through the HTTP trigger.
pub struct ImportRuns {
    runs: DashMap<String, ImportRunStatus>,
    retention: usize,
}

impl Default for ImportRuns {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RUN_RETENTION)
    }
}

impl ImportRuns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            runs: DashMap::new(),
            retention,
        }
    }

    /// Spawns a run in the background and returns its id right away.
    pub fn start(self: &Arc<Self>, fetcher: Arc<BulkFetcher>, params: ImportParams) -> String {
        let run_id = self.begin(params);

        let runs = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            let status = match fetcher.run(params).await {
                Ok(report) => ImportRunStatus::Completed { report },
                Err(e) => {
                    tracing::error!("Import run {} failed: {}", id, e);
                    ImportRunStatus::Failed {
                        error: e.to_string(),
                        finished_at: Utc::now(),
                    }
                }
            };
            runs.finish(id, status);
        });

        run_id
    }

    /// Registers a new run as running.
    pub(crate) fn begin(&self, params: ImportParams) -> String {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.runs.insert(
            run_id.clone(),
            ImportRunStatus::Running {
                params,
                started_at: Utc::now(),
            },
        );
        run_id
    }

    /// Records the final status of a run and evicts the oldest finished runs beyond the
    /// retention limit.
    pub(crate) fn finish(&self, run_id: String, status: ImportRunStatus) {
        self.runs.insert(run_id, status);

        let mut finished: Vec<_> = self
            .runs
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .finished_at()
                    .map(|at| (at, entry.key().clone()))
            })
            .collect();
        if finished.len() <= self.retention {
            return;
        }

        finished.sort();
        let excess = finished.len() - self.retention;
        for (_, run_id) in finished.into_iter().take(excess) {
            self.runs.remove(&run_id);
        }
        tracing::debug!("Evicted {} finished import runs", excess);
    }

    pub fn get(&self, run_id: &str) -> Option<ImportRunStatus> {
        self.runs.get(run_id).map(|status| status.value().clone())
    }

    /// Whether any run is still in progress.
    pub fn any_running(&self) -> bool {
        self.runs.iter().any(|entry| !entry.value().is_finished())
    }

    /// Runs currently tracked, finished or not.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
