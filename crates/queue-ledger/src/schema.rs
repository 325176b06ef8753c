use queue_core::QueueError;
use queue_postgres::validate_identifier;

/// Idempotent schema creation for `runs`, `artifacts`, and
/// `run_bundle_links`, scoped under `schema` (the same schema the work
/// queue itself lives in).
pub async fn ensure_schema(pool: &sqlx::PgPool, schema: &str) -> Result<(), QueueError> {
    validate_identifier(schema)?;

    let create_runs = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.runs (
            run_id UUID PRIMARY KEY,
            work_item_id UUID NOT NULL,
            worker_id TEXT NOT NULL,
            model_identity TEXT,
            options_json JSONB,
            started_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            ended_at TIMESTAMPTZ,
            status TEXT NOT NULL DEFAULT 'running'
                CHECK (status IN ('running', 'succeeded', 'failed')),
            metrics_json JSONB,
            error_text TEXT
        )
        "#
    );
    sqlx::query(&create_runs).execute(pool).await.map_err(crate::pg_err)?;

    let create_index = format!(
        "CREATE INDEX IF NOT EXISTS idx_runs_work_item_id ON {schema}.runs (work_item_id)"
    );
    sqlx::query(&create_index).execute(pool).await.map_err(crate::pg_err)?;

    let create_artifacts = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.artifacts (
            artifact_id UUID PRIMARY KEY,
            run_id UUID NOT NULL REFERENCES {schema}.runs (run_id),
            artifact_type TEXT NOT NULL,
            lake_uri TEXT NOT NULL,
            content_sha256 TEXT NOT NULL,
            byte_count BIGINT NOT NULL,
            content_mime_type TEXT NOT NULL,
            stored_in_sql BOOLEAN NOT NULL DEFAULT FALSE,
            mirrored_to_lake BOOLEAN NOT NULL DEFAULT FALSE,
            inline_content BYTEA,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#
    );
    sqlx::query(&create_artifacts).execute(pool).await.map_err(crate::pg_err)?;

    let create_artifacts_index = format!(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_run_id ON {schema}.artifacts (run_id)"
    );
    sqlx::query(&create_artifacts_index).execute(pool).await.map_err(crate::pg_err)?;

    let create_bundle_links = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.run_bundle_links (
            run_id UUID NOT NULL REFERENCES {schema}.runs (run_id),
            bundle_id UUID NOT NULL,
            PRIMARY KEY (run_id, bundle_id)
        )
        "#
    );
    sqlx::query(&create_bundle_links).execute(pool).await.map_err(crate::pg_err)?;

    Ok(())
}
