use card_catalog::app::Services;
use card_catalog::config::AppConfig;
use card_catalog::ingestion::ImportParams;
use card_catalog::ingestion::ImportRunStatus;
use card_catalog::ingestion::trigger::TriggerClient;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "card-catalog", about = "Trading card catalog importer and search service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the HTTP API together with the batch writers.
    Serve {
        /// Overrides CATALOG_BIND.
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Asks a running server to start an import. Meant for cron.
    Trigger {
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
        /// Overrides CATALOG_LOOKBACK_DAYS.
        #[arg(long)]
        lookback_days: Option<u32>,
        /// Blocks until the run finishes and fails if the run failed.
        #[arg(long)]
        wait: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        Command::Trigger {
            server,
            lookback_days,
            wait,
        } => {
            let params = ImportParams {
                lookback_days: lookback_days.unwrap_or(config.lookback_days),
            };
            trigger(&server, params, wait).await
        }
    }
}

async fn serve(config: AppConfig, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or(config.bind_addr);
    tracing::info!("Starting card catalog on {}", bind_addr);

    // 1. Store, queue and the services around them:
    let services = Services::from_config(&config)?;

    // 2. Batch writers:
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let workers = services.consumer.clone().start(shutdown_rx);

    // 3. Spawn stats reporter:
    let stats_queue = services.queue.clone();
    let stats_consumer = services.consumer.clone();
    let stats_interval = Duration::from_secs(config.stats_interval_secs.max(1));
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_interval);
        loop {
            interval.tick().await;
            let queue = stats_queue.stats();
            let totals = stats_consumer.totals();
            tracing::info!(
                "Queue: {} visible, {} in flight, {} dead-lettered | Writes: {} batches, {} ok, {} stale, {} failed",
                queue.visible,
                queue.in_flight,
                queue.dead_lettered,
                totals.batches,
                totals.succeeded,
                totals.stale,
                totals.failed
            );
        }
    });

    // 4. Start HTTP server:
    let app = services.router();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    // 5. Stop the workers. Batches in progress finish; anything unacknowledged is
    // redelivered on the next start when a journal is configured.
    tracing::info!("Shutting down batch writers");
    reporter.abort();
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!("Batch worker ended abnormally: {}", e);
        }
    }

    let totals = services.consumer.totals();
    tracing::info!(
        "Final totals: {} written, {} stale, {} dead-lettered",
        totals.succeeded,
        totals.stale,
        totals.dead_lettered
    );
    Ok(())
}

async fn trigger(server: &str, params: ImportParams, wait: bool) -> anyhow::Result<()> {
    let client = TriggerClient::new(server);
    let accepted = client.trigger(params).await?;
    tracing::info!(
        "Import run {} started (lookback {} days)",
        accepted.run_id,
        accepted.lookback_days
    );

    if !wait {
        return Ok(());
    }

    match client.wait(&accepted.run_id, Duration::from_secs(5)).await? {
        ImportRunStatus::Completed { report } => {
            tracing::info!(
                "Import run {} completed: {} scanned, {} published, {} publish failures",
                accepted.run_id,
                report.scanned,
                report.published,
                report.publish_failures
            );
            Ok(())
        }
        ImportRunStatus::Failed { error, .. } => {
            anyhow::bail!("Import run {} failed: {}", accepted.run_id, error)
        }
        ImportRunStatus::Running { .. } => {
            anyhow::bail!("Import run {} is still running", accepted.run_id)
        }
    }
}
