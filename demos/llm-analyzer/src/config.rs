use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub schema: String,
    pub lake_root: String,
    pub anthropic_api_key: String,
    pub model: String,
    pub worker_count: Option<usize>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            schema: env::var("LLM_ANALYZER_SCHEMA")
                .unwrap_or_else(|_| "llm_analyzer".to_string()),
            lake_root: env::var("LLM_ANALYZER_LAKE_ROOT")
                .unwrap_or_else(|_| "./lake".to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY must be set")?,
            model: env::var("LLM_ANALYZER_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".to_string()),
            worker_count: env::var("LLM_ANALYZER_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok()),
        })
    }
}
