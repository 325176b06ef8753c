use async_trait::async_trait;
use queue_core::{ArtifactId, ArtifactRef, QueueError, RunId, RunLedger, RunStatus, WorkItemId, WorkerId};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgRunLedger {
    pool: PgPool,
    schema: String,
}

impl PgRunLedger {
    /// Assumes `schema.runs`/`schema.artifacts` already exist; call
    /// [`crate::schema::ensure_schema`] first.
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    fn runs(&self) -> String {
        format!("{}.runs", self.schema)
    }

    fn artifacts(&self) -> String {
        format!("{}.artifacts", self.schema)
    }

    fn bundle_links(&self) -> String {
        format!("{}.run_bundle_links", self.schema)
    }
}

fn run_status_str(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Succeeded => "succeeded",
        RunStatus::Failed => "failed",
    }
}

#[async_trait]
impl RunLedger for PgRunLedger {
    async fn start_run(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        model_identity: Option<&str>,
        options: Option<Value>,
    ) -> Result<RunId, QueueError> {
        let run_id = RunId::new();
        let sql = format!(
            r#"
            INSERT INTO {} (run_id, work_item_id, worker_id, model_identity, options_json, status)
            VALUES ($1, $2, $3, $4, $5, 'running')
            "#,
            self.runs()
        );
        sqlx::query(&sql)
            .bind(run_id.0)
            .bind(work_item_id.0)
            .bind(&worker_id.0)
            .bind(model_identity)
            .bind(options)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        metrics: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = $1, ended_at = NOW(), metrics_json = $2, error_text = $3
            WHERE run_id = $4 AND status = 'running'
            "#,
            self.runs()
        );
        sqlx::query(&sql)
            .bind(run_status_str(status))
            .bind(metrics)
            .bind(error)
            .bind(run_id.0)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(())
    }

    async fn attach_artifact(
        &self,
        run_id: RunId,
        artifact: &ArtifactRef,
        artifact_type: &str,
        mime: &str,
    ) -> Result<ArtifactId, QueueError> {
        let artifact_id = ArtifactId::new();
        let sql = format!(
            r#"
            INSERT INTO {} (
                artifact_id, run_id, artifact_type, lake_uri, content_sha256,
                byte_count, content_mime_type, stored_in_sql, mirrored_to_lake
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, TRUE)
            "#,
            self.artifacts()
        );
        sqlx::query(&sql)
            .bind(artifact_id.0)
            .bind(run_id.0)
            .bind(artifact_type)
            .bind(&artifact.lake_uri)
            .bind(&artifact.content_sha256)
            .bind(artifact.byte_count as i64)
            .bind(mime)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(artifact_id)
    }

    async fn link_run_to_bundle(&self, run_id: RunId, bundle_id: Uuid) -> Result<(), QueueError> {
        let sql = format!(
            r#"
            INSERT INTO {} (run_id, bundle_id)
            VALUES ($1, $2)
            ON CONFLICT (run_id, bundle_id) DO NOTHING
            "#,
            self.bundle_links()
        );
        sqlx::query(&sql)
            .bind(run_id.0)
            .bind(bundle_id)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(())
    }
}

impl PgRunLedger {
    /// Not part of the `RunLedger` trait: lets an operator inspect a run's
    /// recorded artifacts, used by the demo binaries' status output.
    pub async fn artifacts_for_run(&self, run_id: RunId) -> Result<Vec<ArtifactRef>, QueueError> {
        let sql = format!(
            "SELECT lake_uri, content_sha256, byte_count FROM {} WHERE run_id = $1",
            self.artifacts()
        );
        let rows = sqlx::query(&sql).bind(run_id.0).fetch_all(&self.pool).await.map_err(crate::pg_err)?;
        Ok(rows
            .into_iter()
            .map(|row| ArtifactRef {
                lake_uri: row.get("lake_uri"),
                content_sha256: row.get("content_sha256"),
                byte_count: row.get::<i64, _>("byte_count") as u64,
            })
            .collect())
    }
}
