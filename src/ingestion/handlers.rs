use super::fetcher::BulkFetcher;
use super::runs::ImportRuns;
use super::types::{
    ImportParams, ImportRunResponse, TriggerImportRequest, TriggerImportResponse,
};

use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use std::sync::Arc;

pub const ENDPOINT_IMPORT: &str = "/import";
pub const ENDPOINT_IMPORT_STATUS: &str = "/import/:run_id";

/// Starts an import run. The body is optional; without it the configured lookback applies.
pub async fn handle_trigger_import(
    Extension(runs): Extension<Arc<ImportRuns>>,
    Extension(fetcher): Extension<Arc<BulkFetcher>>,
    Extension(defaults): Extension<ImportParams>,
    body: Option<Json<TriggerImportRequest>>,
) -> (StatusCode, Json<TriggerImportResponse>) {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let params = ImportParams {
        lookback_days: request.lookback_days.unwrap_or(defaults.lookback_days),
    };

    if runs.any_running() {
        tracing::warn!("Starting an import while another one is still running");
    }

    let run_id = runs.start(fetcher, params);
    tracing::info!(
        "Accepted import run {} (lookback {} days)",
        run_id,
        params.lookback_days
    );

    (
        StatusCode::ACCEPTED,
        Json(TriggerImportResponse {
            run_id,
            lookback_days: params.lookback_days,
        }),
    )
}

pub async fn handle_import_status(
    Path(run_id): Path<String>,
    Extension(runs): Extension<Arc<ImportRuns>>,
) -> (StatusCode, Json<ImportRunResponse>) {
    match runs.get(&run_id) {
        Some(status) => (
            StatusCode::OK,
            Json(ImportRunResponse {
                run_id,
                found: true,
                status: Some(status),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ImportRunResponse {
                run_id,
                found: false,
                status: None,
            }),
        ),
    }
}
