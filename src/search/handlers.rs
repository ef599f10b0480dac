use super::engine::QueryEngine;
use super::types::{SearchError, SearchErrorResponse, SearchParams, SearchRequest, SearchResponse};

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use std::sync::Arc;

pub const ENDPOINT_SEARCH: &str = "/cards/search";

pub async fn handle_search(
    Query(params): Query<SearchParams>,
    Extension(engine): Extension<Arc<QueryEngine>>,
) -> Response {
    let request = SearchRequest {
        query_text: params.q.clone(),
        limit: params.limit,
        continuation_token: params.token,
        mode: params.mode,
    };

    match engine.search(request).await {
        Ok(result) => (
            StatusCode::OK,
            Json(SearchResponse {
                query: params.q,
                count: result.results.len(),
                results: result.results,
                continuation_token: result.continuation_token,
                partial: result.partial,
                failed_partitions: result.failed_partitions,
            }),
        )
            .into_response(),
        Err(e @ SearchError::InvalidQuery(_)) => {
            tracing::debug!("Rejected search '{}': {}", params.q, e);
            (
                StatusCode::BAD_REQUEST,
                Json(SearchErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Search '{}' failed: {}", params.q, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
