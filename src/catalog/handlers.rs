use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

use super::partitioner::all_partitions;
use super::protocol::{GetCardResponse, PartitionCount, PartitionCountsResponse};
use super::store::CatalogStore;
use super::types::{PartitionKey, StoreError};

pub async fn handle_get_card(
    Extension(store): Extension<Arc<dyn CatalogStore>>,
    Path((partition, sort_key)): Path<(String, String)>,
) -> (StatusCode, Json<GetCardResponse>) {
    match store.get(&PartitionKey(partition), &sort_key).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(GetCardResponse {
                found: true,
                record: Some(record),
            }),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(GetCardResponse {
                found: false,
                record: None,
            }),
        ),
        Err(StoreError::UnknownPartition(partition)) => {
            tracing::debug!("GET: unknown partition '{}'", partition);
            (
                StatusCode::BAD_REQUEST,
                Json(GetCardResponse {
                    found: false,
                    record: None,
                }),
            )
        }
        Err(e) => {
            tracing::error!("GET: store lookup failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(GetCardResponse {
                    found: false,
                    record: None,
                }),
            )
        }
    }
}

pub async fn handle_partition_counts(
    Extension(store): Extension<Arc<dyn CatalogStore>>,
) -> (StatusCode, Json<PartitionCountsResponse>) {
    let mut partitions = Vec::new();
    for partition in all_partitions() {
        match store.partition_len(&partition).await {
            Ok(records) => partitions.push(PartitionCount { partition, records }),
            Err(e) => {
                tracing::warn!("Failed to count partition {}: {}", partition, e);
            }
        }
    }

    let total = partitions.iter().map(|count| count.records).sum();
    (
        StatusCode::OK,
        Json(PartitionCountsResponse { total, partitions }),
    )
}
