use async_trait::async_trait;
use queue_core::{QueueError, WorkerHeartbeat, WorkerId, WorkerRegistry, WorkerStatus};
use sqlx::{PgPool, Row};

#[derive(Clone)]
pub struct PgWorkerRegistry {
    pool: PgPool,
    schema: String,
}

impl PgWorkerRegistry {
    /// Assumes `schema.worker_heartbeats` already exists; call
    /// `PgStateStore::new` (or `schema::ensure_schema` directly) first.
    pub fn new(pool: PgPool, schema: &str) -> Self {
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    fn table(&self) -> String {
        format!("{}.worker_heartbeats", self.schema)
    }
}

fn status_str(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Active => "active",
        WorkerStatus::Idle => "idle",
        WorkerStatus::Paused => "paused",
        WorkerStatus::Stopping => "stopping",
        WorkerStatus::Stopped => "stopped",
    }
}

fn parse_status(value: &str) -> WorkerStatus {
    match value {
        "active" => WorkerStatus::Active,
        "idle" => WorkerStatus::Idle,
        "paused" => WorkerStatus::Paused,
        "stopping" => WorkerStatus::Stopping,
        _ => WorkerStatus::Stopped,
    }
}

#[async_trait]
impl WorkerRegistry for PgWorkerRegistry {
    async fn upsert_heartbeat(&self, heartbeat: WorkerHeartbeat) -> Result<(), QueueError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                worker_id, hostname, pid, started_at, last_heartbeat_at,
                items_processed, items_succeeded, items_failed, status, current_work_item_id
            )
            VALUES ($1, $2, $3, $4, NOW(), $5, $6, $7, $8, $9)
            ON CONFLICT (worker_id) DO UPDATE SET
                hostname = EXCLUDED.hostname,
                pid = EXCLUDED.pid,
                last_heartbeat_at = NOW(),
                items_processed = EXCLUDED.items_processed,
                items_succeeded = EXCLUDED.items_succeeded,
                items_failed = EXCLUDED.items_failed,
                status = EXCLUDED.status,
                current_work_item_id = EXCLUDED.current_work_item_id
            "#,
            self.table()
        );
        sqlx::query(&sql)
            .bind(&heartbeat.worker_id.0)
            .bind(&heartbeat.hostname)
            .bind(heartbeat.pid as i32)
            .bind(heartbeat.started_at)
            .bind(heartbeat.items_processed)
            .bind(heartbeat.items_succeeded)
            .bind(heartbeat.items_failed)
            .bind(status_str(heartbeat.status))
            .bind(heartbeat.current_work_item_id.map(|id| id.0))
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(())
    }

    async fn list_active(&self, timeout_seconds: i64) -> Result<Vec<WorkerHeartbeat>, QueueError> {
        let sql = format!(
            "SELECT * FROM {} WHERE last_heartbeat_at >= NOW() - make_interval(secs => $1)",
            self.table()
        );
        let rows = sqlx::query(&sql)
            .bind(timeout_seconds)
            .fetch_all(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let status_text: String = row.get("status");
                let current: Option<uuid::Uuid> = row.get("current_work_item_id");
                WorkerHeartbeat {
                    worker_id: WorkerId(row.get("worker_id")),
                    hostname: row.get("hostname"),
                    pid: row.get::<i32, _>("pid") as u32,
                    started_at: row.get("started_at"),
                    last_heartbeat_at: row.get("last_heartbeat_at"),
                    items_processed: row.get("items_processed"),
                    items_succeeded: row.get("items_succeeded"),
                    items_failed: row.get("items_failed"),
                    status: parse_status(&status_text),
                    current_work_item_id: current.map(queue_core::WorkItemId),
                }
            })
            .collect())
    }

    async fn remove(&self, worker_id: &WorkerId) -> Result<(), QueueError> {
        let sql = format!("DELETE FROM {} WHERE worker_id = $1", self.table());
        sqlx::query(&sql).bind(&worker_id.0).execute(&self.pool).await.map_err(crate::pg_err)?;
        Ok(())
    }
}
