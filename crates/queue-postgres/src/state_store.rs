use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queue_core::{
    backoff, NewWorkItem, QueueError, QueueStats, RecrawlFilter, StateStore, WorkItem,
    WorkItemId, WorkItemStatus, WorkPayload, WorkerId,
};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::schema::{ensure_schema, validate_identifier};

/// Postgres-backed `StateStore`. Claiming uses a `claimable` CTE plus
/// `FOR UPDATE SKIP LOCKED` so concurrent workers never contend on the same
/// row; everything else is a single-statement, row-scoped update.
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
    schema: String,
}

impl PgStateStore {
    /// Connects to `schema` (creating its tables if absent). `schema` must
    /// pass [`validate_identifier`] since it is interpolated into SQL text.
    pub async fn new(pool: PgPool, schema: &str) -> Result<Self, QueueError> {
        validate_identifier(schema)?;
        ensure_schema(&pool, schema).await?;
        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn table(&self, name: &str) -> String {
        format!("{}.{name}", self.schema)
    }
}

fn row_to_work_item(row: &sqlx::postgres::PgRow) -> Result<WorkItem, QueueError> {
    let payload_json: serde_json::Value = row.get("payload");
    let payload: WorkPayload = serde_json::from_value(payload_json)
        .map_err(|e| QueueError::Backend(anyhow::anyhow!("invalid payload json: {e}")))?;
    let status_text: String = row.get("status");
    let status = match status_text.as_str() {
        "pending" => WorkItemStatus::Pending,
        "in_progress" => WorkItemStatus::InProgress,
        "completed" => WorkItemStatus::Completed,
        "failed" => WorkItemStatus::Failed,
        "skipped" => WorkItemStatus::Skipped,
        other => {
            return Err(QueueError::Backend(anyhow::anyhow!(
                "unknown work item status in database: {other}"
            )))
        }
    };
    let claimed_by: Option<String> = row.get("claimed_by");
    let discovered_from: Option<uuid::Uuid> = row.get("discovered_from");

    Ok(WorkItem {
        work_item_id: WorkItemId(row.get("work_item_id")),
        source_system: row.get("source_system"),
        source_name: row.get("source_name"),
        resource_type: row.get("resource_type"),
        resource_id: row.get("resource_id"),
        variant: row.get("variant"),
        dedupe_key: row.get("dedupe_key"),
        payload,
        priority: row.get("priority"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        run_id: row.get("run_id"),
        discovered_from: discovered_from.map(WorkItemId),
        rank: row.get("rank"),
        status,
        attempt: row.get("attempt"),
        last_error: row.get("last_error"),
        next_retry_at: row.get("next_retry_at"),
        claimed_by: claimed_by.map(WorkerId),
        claimed_at: row.get("claimed_at"),
        lease_expires_at: row.get("lease_expires_at"),
    })
}

#[async_trait]
impl StateStore for PgStateStore {
    async fn enqueue(&self, item: NewWorkItem) -> Result<bool, QueueError> {
        let dedupe_key = item.dedupe_key();
        if dedupe_key.len() > queue_core::model::DEDUPE_KEY_MAX_LEN {
            return Err(QueueError::DedupeKeyTooLong {
                key: dedupe_key,
                max: queue_core::model::DEDUPE_KEY_MAX_LEN,
            });
        }
        let payload_json = serde_json::to_value(&item.payload)
            .map_err(|e| QueueError::Backend(anyhow::anyhow!(e)))?;
        let work_item_id = uuid::Uuid::now_v7();

        let sql = format!(
            r#"
            INSERT INTO {} (
                work_item_id, source_system, source_name, resource_type, resource_id,
                variant, dedupe_key, payload, priority, run_id, discovered_from, rank
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (dedupe_key) DO NOTHING
            "#,
            self.table("work_items")
        );

        let result = sqlx::query(&sql)
            .bind(work_item_id)
            .bind(&item.source_system)
            .bind(&item.source_name)
            .bind(&item.resource_type)
            .bind(&item.resource_id)
            .bind(&item.variant)
            .bind(&dedupe_key)
            .bind(payload_json)
            .bind(item.priority)
            .bind(&item.run_id)
            .bind(item.discovered_from.map(|id| id.0))
            .bind(item.rank)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim_one(
        &self,
        worker_id: &WorkerId,
        lease_seconds: i64,
        source_filter: Option<&str>,
    ) -> Result<Option<WorkItem>, QueueError> {
        let table = self.table("work_items");
        let filter_clause = if source_filter.is_some() {
            "AND source_system = $4"
        } else {
            ""
        };

        let sql = format!(
            r#"
            WITH claimable AS (
                SELECT work_item_id
                FROM {table}
                WHERE (
                    (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
                    OR (status = 'in_progress' AND lease_expires_at < NOW())
                )
                {filter_clause}
                ORDER BY priority ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE {table}
            SET status = 'in_progress',
                claimed_by = $1,
                claimed_at = NOW(),
                lease_expires_at = NOW() + make_interval(secs => $2),
                updated_at = NOW(),
                attempt = attempt + 1
            WHERE work_item_id IN (SELECT work_item_id FROM claimable)
            RETURNING *
            "#
        );

        let mut query = sqlx::query(&sql).bind(&worker_id.0).bind(lease_seconds);
        if let Some(source) = source_filter {
            query = query.bind(source);
        }

        let row = query.fetch_optional(&self.pool).await.map_err(crate::pg_err)?;
        row.as_ref().map(row_to_work_item).transpose()
    }

    async fn renew_lease(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        lease_seconds: i64,
    ) -> Result<bool, QueueError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET lease_expires_at = NOW() + make_interval(secs => $1),
                updated_at = NOW()
            WHERE work_item_id = $2 AND claimed_by = $3 AND status = 'in_progress'
            "#,
            self.table("work_items")
        );
        let result = sqlx::query(&sql)
            .bind(lease_seconds)
            .bind(work_item_id.0)
            .bind(&worker_id.0)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, work_item_id: WorkItemId, worker_id: &WorkerId) -> Result<bool, QueueError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'completed',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE work_item_id = $1 AND claimed_by = $2 AND status = 'in_progress'
            "#,
            self.table("work_items")
        );
        let result = sqlx::query(&sql)
            .bind(work_item_id.0)
            .bind(&worker_id.0)
            .execute(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn fail(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        error: &str,
        retryable: bool,
        backoff_hint: Option<Duration>,
        max_retries: i32,
    ) -> Result<bool, QueueError> {
        let mut tx = self.pool.begin().await.map_err(crate::pg_err)?;
        let table = self.table("work_items");

        let select_sql = format!(
            "SELECT attempt FROM {table} WHERE work_item_id = $1 AND claimed_by = $2 AND status = 'in_progress' FOR UPDATE"
        );
        let row = sqlx::query(&select_sql)
            .bind(work_item_id.0)
            .bind(&worker_id.0)
            .fetch_optional(&mut *tx)
            .await.map_err(crate::pg_err)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(crate::pg_err)?;
            return Ok(false);
        };
        let attempt: i32 = row.get("attempt");

        if retryable && attempt < max_retries {
            let delay = backoff_hint.unwrap_or_else(|| {
                backoff::exponential_with_jitter(attempt.max(1) as u32, 2.0, 300.0)
            });
            let next_retry_at: DateTime<Utc> = Utc::now()
                + chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(300));

            let sql = format!(
                r#"
                UPDATE {table}
                SET status = 'pending',
                    next_retry_at = $1,
                    last_error = $2,
                    claimed_by = NULL,
                    claimed_at = NULL,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE work_item_id = $3
                "#
            );
            sqlx::query(&sql)
                .bind(next_retry_at)
                .bind(error)
                .bind(work_item_id.0)
                .execute(&mut *tx)
                .await.map_err(crate::pg_err)?;
        } else {
            let sql = format!(
                r#"
                UPDATE {table}
                SET status = 'failed',
                    last_error = $1,
                    claimed_by = NULL,
                    claimed_at = NULL,
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE work_item_id = $2
                "#
            );
            sqlx::query(&sql)
                .bind(error)
                .bind(work_item_id.0)
                .execute(&mut *tx)
                .await.map_err(crate::pg_err)?;
        }

        tx.commit().await.map_err(crate::pg_err)?;
        Ok(true)
    }

    async fn recover_expired_leases(&self) -> Result<u64, QueueError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = 'pending',
                claimed_by = NULL,
                claimed_at = NULL,
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE status = 'in_progress' AND lease_expires_at < NOW()
            "#,
            self.table("work_items")
        );
        let result = sqlx::query(&sql).execute(&self.pool).await.map_err(crate::pg_err)?;
        let recovered = result.rows_affected();
        if recovered > 0 {
            debug!(recovered, "recovered expired leases");
        }
        Ok(recovered)
    }

    async fn exists(&self, dedupe_key: &str) -> Result<bool, QueueError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE dedupe_key = $1",
            self.table("work_items")
        );
        let row = sqlx::query(&sql)
            .bind(dedupe_key)
            .fetch_optional(&self.pool)
            .await.map_err(crate::pg_err)?;
        Ok(row.is_some())
    }

    async fn get(&self, work_item_id: WorkItemId) -> Result<Option<WorkItem>, QueueError> {
        let sql = format!(
            "SELECT * FROM {} WHERE work_item_id = $1",
            self.table("work_items")
        );
        let row = sqlx::query(&sql)
            .bind(work_item_id.0)
            .fetch_optional(&self.pool)
            .await.map_err(crate::pg_err)?;
        row.as_ref().map(row_to_work_item).transpose()
    }

    async fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        let sql = format!(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed,
                COUNT(*) FILTER (WHERE status = 'skipped') AS skipped
            FROM {}
            "#,
            self.table("work_items")
        );
        let row = sqlx::query(&sql).fetch_one(&self.pool).await.map_err(crate::pg_err)?;
        Ok(QueueStats {
            pending: row.get("pending"),
            in_progress: row.get("in_progress"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            skipped: row.get("skipped"),
        })
    }

    async fn reset_for_recrawl(&self, filter: &RecrawlFilter) -> Result<u64, QueueError> {
        let table = self.table("work_items");
        let mut clauses = vec!["status = 'completed'".to_string()];
        let mut binds: Vec<&str> = Vec::new();
        if let Some(source_system) = filter.source_system.as_deref() {
            clauses.push(format!("source_system = ${}", binds.len() + 1));
            binds.push(source_system);
        }
        if let Some(source_name) = filter.source_name.as_deref() {
            clauses.push(format!("source_name = ${}", binds.len() + 1));
            binds.push(source_name);
        }
        if let Some(resource_type) = filter.resource_type.as_deref() {
            clauses.push(format!("resource_type = ${}", binds.len() + 1));
            binds.push(resource_type);
        }

        let sql = format!(
            r#"
            UPDATE {table}
            SET status = 'pending',
                attempt = 0,
                last_error = NULL,
                next_retry_at = NULL,
                updated_at = NOW()
            WHERE {}
            "#,
            clauses.join(" AND ")
        );

        let mut query = sqlx::query(&sql);
        for value in &binds {
            query = query.bind(*value);
        }
        let result = query.execute(&self.pool).await.map_err(crate::pg_err)?;
        Ok(result.rows_affected())
    }
}

