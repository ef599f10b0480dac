//! Service Wiring
//!
//! Builds the shared components from an `AppConfig` and exposes them over one HTTP router.

use crate::catalog::handlers::{handle_get_card, handle_partition_counts};
use crate::catalog::memory::InMemoryCatalog;
use crate::catalog::protocol::{ENDPOINT_GET_CARD, ENDPOINT_PARTITIONS};
use crate::catalog::store::CatalogStore;
use crate::config::AppConfig;
use crate::ingestion::handlers::{
    ENDPOINT_IMPORT, ENDPOINT_IMPORT_STATUS, handle_import_status, handle_trigger_import,
};
use crate::ingestion::{BulkFetcher, ImportParams, ImportRuns};
use crate::queue::handlers::{handle_dead_letters, handle_queue_stats};
use crate::queue::protocol::{ENDPOINT_DEAD_LETTERS, ENDPOINT_QUEUE_STATS};
use crate::queue::{ImportQueue, MessagePublisher};
use crate::search::QueryEngine;
use crate::search::handlers::{ENDPOINT_SEARCH, handle_search};
use crate::writer::{BatchConsumer, BatchWriter};

use anyhow::Context;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

pub struct Services {
    pub store: Arc<dyn CatalogStore>,
    pub queue: Arc<ImportQueue>,
    pub consumer: Arc<BatchConsumer>,
    pub fetcher: Arc<BulkFetcher>,
    pub engine: Arc<QueryEngine>,
    pub runs: Arc<ImportRuns>,
    pub import_defaults: ImportParams,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let mut catalog = InMemoryCatalog::new();
        if let Some(capacity) = config.store_write_capacity {
            catalog = catalog.with_write_capacity(capacity);
        }
        let store: Arc<dyn CatalogStore> = Arc::new(catalog);

        let queue = match &config.queue_journal {
            Some(path) => {
                let queue = ImportQueue::open(config.queue_settings(), path)
                    .with_context(|| format!("Failed to open queue journal {}", path.display()))?;
                tracing::info!(
                    "Queue journal {} restored {} pending messages",
                    path.display(),
                    queue.len()
                );
                queue
            }
            None => {
                tracing::warn!("No queue journal configured, pending imports are lost on restart");
                ImportQueue::in_memory(config.queue_settings())
            }
        };
        let queue = Arc::new(queue);

        Ok(Self::assemble(store, queue, config))
    }

    /// Wires the services around an existing store and queue.
    pub fn assemble(
        store: Arc<dyn CatalogStore>,
        queue: Arc<ImportQueue>,
        config: &AppConfig,
    ) -> Self {
        let consumer_settings = config.consumer_settings();
        let writer = BatchWriter::new(store.clone(), consumer_settings.max_deliveries);
        let consumer = BatchConsumer::new(queue.clone(), writer, consumer_settings);

        let publisher: Arc<dyn MessagePublisher> = queue.clone();
        let fetcher = Arc::new(BulkFetcher::new(config.fetcher_settings(), publisher));
        let engine = Arc::new(QueryEngine::new(store.clone(), config.search_settings()));

        Self {
            store,
            queue,
            consumer,
            fetcher,
            engine,
            runs: Arc::new(ImportRuns::new()),
            import_defaults: config.import_params(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_SEARCH, get(handle_search))
            .route(ENDPOINT_PARTITIONS, get(handle_partition_counts))
            .route(ENDPOINT_GET_CARD, get(handle_get_card))
            .route(ENDPOINT_IMPORT, post(handle_trigger_import))
            .route(ENDPOINT_IMPORT_STATUS, get(handle_import_status))
            .route(ENDPOINT_QUEUE_STATS, get(handle_queue_stats))
            .route(ENDPOINT_DEAD_LETTERS, get(handle_dead_letters))
            .layer(Extension(self.store.clone()))
            .layer(Extension(self.queue.clone()))
            .layer(Extension(self.engine.clone()))
            .layer(Extension(self.fetcher.clone()))
            .layer(Extension(self.runs.clone()))
            .layer(Extension(self.import_defaults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::protocol::{GetCardResponse, PartitionCountsResponse};
    use crate::ingestion::ImportRunResponse;
    use crate::queue::protocol::QueueStatsResponse;
    use crate::queue::QueueSettings;
    use crate::search::SearchResponse;
    use crate::test_support::{base_time, card};
    use std::net::SocketAddr;

    async fn serve(services: &Services) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = services.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn services() -> Services {
        let config = AppConfig::default();
        Services::assemble(
            Arc::new(InMemoryCatalog::new()),
            Arc::new(ImportQueue::in_memory(QueueSettings::default())),
            &config,
        )
    }

    #[tokio::test]
    async fn test_published_cards_become_searchable_over_http() {
        // ARRANGE
        let services = services();
        for (id, name, number) in [
            ("c1", "Lightning Bolt", "1"),
            ("c2", "Lightning Helix", "2"),
            ("c3", "Llanowar Elves", "3"),
        ] {
            services
                .queue
                .publish(card(id, name, "m10", number, base_time()))
                .await
                .unwrap();
        }
        let report = services.consumer.drain().await;
        assert_eq!(report.succeeded, 3);

        let addr = serve(&services).await;
        let client = reqwest::Client::new();

        // ACT
        let search: SearchResponse = client
            .get(format!("http://{}/cards/search?q=lightning", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let counts: PartitionCountsResponse = client
            .get(format!("http://{}/cards/partitions", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let stats: QueueStatsResponse = client
            .get(format!("http://{}/queue/stats", addr))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        // ASSERT
        let names: Vec<&str> = search.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Lightning Bolt", "Lightning Helix"]);
        assert!(!search.partial);
        assert_eq!(counts.total, 3);
        assert_eq!(stats.pending, 0);

        let bolt = &search.results[0];
        let lookup = client
            .get(format!(
                "http://{}/cards/{}/{}",
                addr, bolt.partition_key, bolt.sort_key
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(lookup.status(), 200);
        let lookup: GetCardResponse = lookup.json().await.unwrap();
        assert_eq!(lookup.record.map(|r| r.card_id), Some("c1".to_string()));
    }

    #[tokio::test]
    async fn test_http_error_statuses() {
        let services = services();
        let addr = serve(&services).await;
        let client = reqwest::Client::new();

        let empty = client
            .get(format!("http://{}/cards/search?q=%20%20", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), 400);

        let unknown_run = client
            .get(format!("http://{}/import/does-not-exist", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown_run.status(), 404);
        let body: ImportRunResponse = unknown_run.json().await.unwrap();
        assert!(!body.found);

        let missing = client
            .get(format!("http://{}/cards/z/zzz%7Cm10%7C1", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }
}
