use axum::{Json, extract::Extension, http::StatusCode};
use std::sync::Arc;

use super::protocol::{DeadLettersResponse, QueueStatsResponse};
use super::queue::ImportQueue;

pub async fn handle_queue_stats(
    Extension(queue): Extension<Arc<ImportQueue>>,
) -> (StatusCode, Json<QueueStatsResponse>) {
    let stats = queue.stats();
    (
        StatusCode::OK,
        Json(QueueStatsResponse {
            stats,
            pending: stats.visible + stats.in_flight,
        }),
    )
}

pub async fn handle_dead_letters(
    Extension(queue): Extension<Arc<ImportQueue>>,
) -> (StatusCode, Json<DeadLettersResponse>) {
    let dead_letters = queue.dead_letters();
    (
        StatusCode::OK,
        Json(DeadLettersResponse {
            count: dead_letters.len(),
            dead_letters,
        }),
    )
}
