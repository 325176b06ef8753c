//! Demo worker pool: claims `Fetch` work items, retrieves the URL over
//! HTTP, stores the response body as an artifact, and discovers outbound
//! links on the same host as new work items.
//!
//! Shows how to plug a `Handler` and a `DiscoveryHook` into the queue
//! crates directly with `reqwest` - no adapter layer in between.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use queue_core::{NewWorkItem, RunnerConfig, WorkPayload};
use queue_ledger::{LakeArtifactSink, PgRunLedger};
use queue_postgres::{PgStateStore, PgWorkerRegistry};
use queue_runner::ConcurrentRunner;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod discovery;
mod handler;

use config::Config;
use discovery::LinkDiscovery;
use handler::FetchHandler;

#[derive(Debug, Parser)]
#[command(name = "http-ingest", about = "Durable HTTP fetch worker pool")]
struct Cli {
    /// Seed URL to enqueue before starting the worker pool.
    #[arg(long)]
    seed_url: Option<String>,

    /// Number of concurrent workers; overrides HTTP_INGEST_WORKERS.
    #[arg(long)]
    workers: Option<usize>,

    /// Exit once the queue has drained instead of polling forever.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,http_ingest=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(schema = %config.schema, lake_root = %config.lake_root, "configuration loaded");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PgStateStore::new(pool.clone(), &config.schema).await?);
    let worker_registry = Arc::new(PgWorkerRegistry::new(pool.clone(), &config.schema));
    let ledger = Arc::new(PgRunLedger::new(pool.clone(), &config.schema));
    queue_ledger::schema::ensure_schema(&pool, &config.schema).await?;
    let artifact_sink = Arc::new(LakeArtifactSink::new(&config.lake_root));

    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent("http-ingest-demo/0.1")
        .build()
        .context("failed to build http client")?;

    let handler = Arc::new(FetchHandler::new(http_client));
    let discovery: Arc<dyn queue_core::DiscoveryHook> =
        Arc::new(LinkDiscovery::new(config.max_discovery_depth));

    if let Some(url) = &cli.seed_url {
        use queue_core::StateStore;
        let enqueued = store
            .enqueue(NewWorkItem {
                source_system: "http-ingest".into(),
                source_name: "manual-seed".into(),
                resource_type: "page".into(),
                resource_id: url.clone(),
                variant: None,
                payload: WorkPayload::Fetch {
                    request_uri: url.clone(),
                    request_method: "GET".into(),
                    request_headers: None,
                    request_body: None,
                },
                priority: 0,
                run_id: None,
                discovered_from: None,
                rank: None,
            })
            .await?;
        tracing::info!(url, enqueued, "seed url submitted");
    }

    let mut runner_config = RunnerConfig::default();
    if let Some(workers) = cli.workers.or(config.worker_count) {
        runner_config.max_workers = workers;
    }

    let runner = Arc::new(ConcurrentRunner::new(
        runner_config,
        store,
        worker_registry,
        ledger,
        artifact_sink,
        handler,
        discovery,
    ));

    let shutdown_runner = runner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_runner.shutdown();
        }
    });

    if cli.once {
        let drain_runner = runner.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
                match drain_runner.status().await {
                    Ok(status)
                        if status.queue_stats.pending == 0 && status.queue_stats.in_progress == 0 =>
                    {
                        tracing::info!("queue drained, requesting shutdown");
                        drain_runner.shutdown();
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "status check failed while waiting to drain");
                    }
                }
            }
        });
    }

    let metrics = runner.run(None).await;
    tracing::info!(
        processed = metrics.items_processed,
        succeeded = metrics.items_succeeded,
        failed = metrics.items_failed,
        discovered = metrics.items_discovered,
        "run complete"
    );

    Ok(())
}
