use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Environment-sourced configuration for the demo binary. Distinct from
/// `RunnerConfig`: this carries process-level wiring (database, lake root),
/// `RunnerConfig` carries queue-behavior tunables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub lake_root: String,
    pub worker_count: Option<usize>,
    pub max_discovery_depth: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            schema: env::var("HTTP_INGEST_SCHEMA").unwrap_or_else(|_| "http_ingest".to_string()),
            lake_root: env::var("HTTP_INGEST_LAKE_ROOT")
                .unwrap_or_else(|_| "./lake".to_string()),
            worker_count: env::var("HTTP_INGEST_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok()),
            max_discovery_depth: env::var("HTTP_INGEST_MAX_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2),
        })
    }
}
