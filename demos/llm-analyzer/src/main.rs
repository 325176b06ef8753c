//! Demo worker pool: claims `Interrogation` work items and runs them
//! against the Anthropic messages API. Shows the same queue crates wired
//! to a compute-bound handler instead of an HTTP-fetch one - no discovery,
//! since an interrogation's output does not itself describe new work.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use queue_core::{NewWorkItem, NoDiscovery, RunnerConfig, WorkPayload};
use queue_ledger::{LakeArtifactSink, PgRunLedger};
use queue_postgres::{PgStateStore, PgWorkerRegistry};
use queue_runner::ConcurrentRunner;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod handler;

use config::Config;
use handler::InterrogationHandler;

#[derive(Debug, Parser)]
#[command(name = "llm-analyzer", about = "Durable LLM interrogation worker pool")]
struct Cli {
    /// Seed an interrogation job: the key selecting the prompt template.
    #[arg(long, requires = "seed_text")]
    seed_key: Option<String>,

    /// Text to interrogate, paired with --seed-key.
    #[arg(long)]
    seed_text: Option<String>,

    /// Number of concurrent workers; overrides LLM_ANALYZER_WORKERS.
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
                .unwrap_or_else(|_| "info,llm_analyzer=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(schema = %config.schema, model = %config.model, "configuration loaded");

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
        .timeout(std::time::Duration::from_secs(60))
        .build()
        .context("failed to build http client")?;

    let handler = Arc::new(InterrogationHandler::new(
        http_client,
        config.anthropic_api_key.clone(),
        config.model.clone(),
    ));
    let discovery = Arc::new(NoDiscovery);

    if let (Some(key), Some(text)) = (&cli.seed_key, &cli.seed_text) {
        use queue_core::StateStore;
        let enqueued = store
            .enqueue(NewWorkItem {
                source_system: "llm-analyzer".into(),
                source_name: "manual-seed".into(),
                resource_type: "interrogation".into(),
                resource_id: key.clone(),
                variant: None,
                payload: WorkPayload::Interrogation {
                    interrogation_key: key.clone(),
                    input_json: serde_json::json!({ "text": text }),
                },
                priority: 0,
                run_id: None,
                discovered_from: None,
                rank: None,
            })
            .await?;
        tracing::info!(key, enqueued, "seed interrogation submitted");
    }

    let mut runner_config = RunnerConfig::default();
    runner_config.enable_discovery = false;
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
        "run complete"
    );

    Ok(())
}
