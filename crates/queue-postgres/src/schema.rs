use queue_core::QueueError;

/// SQL reserved words we refuse as a schema identifier. Not exhaustive; it
/// only needs to catch the obvious footguns since the whitelist check below
/// already rejects anything that isn't `[a-z_][a-z0-9_]*`.
const RESERVED_WORDS: &[&str] = &["select", "table", "where", "order", "group", "user"];

const MAX_IDENTIFIER_LEN: usize = 63;

/// Validates a Postgres identifier (schema name, table name) before it is
/// interpolated into DDL text. `sqlx` bind parameters cannot carry
/// identifiers, so schema creation has no choice but to build this part of
/// the SQL as a string; this whitelist is what keeps that safe.
pub fn validate_identifier(identifier: &str) -> Result<(), QueueError> {
    if identifier.is_empty() || identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(QueueError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "must be 1-63 characters",
        });
    }
    let mut chars = identifier.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_lowercase() || first == '_') {
        return Err(QueueError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "must start with a lowercase letter or underscore",
        });
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return Err(QueueError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "must contain only lowercase letters, digits, and underscores",
        });
    }
    if RESERVED_WORDS.contains(&identifier) {
        return Err(QueueError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "is a reserved word",
        });
    }
    Ok(())
}

/// Idempotent schema creation for the work-queue tables, scoped under
/// `schema`. Safe to call on every process startup.
pub async fn ensure_schema(pool: &sqlx::PgPool, schema: &str) -> Result<(), QueueError> {
    validate_identifier(schema)?;

    let create_schema = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
    sqlx::query(&create_schema).execute(pool).await.map_err(crate::pg_err)?;

    let create_work_items = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.work_items (
            work_item_id UUID PRIMARY KEY,
            source_system TEXT NOT NULL,
            source_name TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            variant TEXT,
            dedupe_key TEXT NOT NULL,
            payload JSONB NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            run_id TEXT,
            discovered_from UUID,
            rank INTEGER,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'completed', 'failed', 'skipped')),
            attempt INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            next_retry_at TIMESTAMPTZ,
            claimed_by TEXT,
            claimed_at TIMESTAMPTZ,
            lease_expires_at TIMESTAMPTZ
        )
        "#
    );
    sqlx::query(&create_work_items).execute(pool).await.map_err(crate::pg_err)?;

    for (name, ddl) in [
        (
            "idx_work_items_dedupe_key",
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_work_items_dedupe_key ON {schema}.work_items (dedupe_key)"
            ),
        ),
        (
            "idx_work_items_claimable",
            format!(
                "CREATE INDEX IF NOT EXISTS idx_work_items_claimable ON {schema}.work_items (status, priority, created_at)"
            ),
        ),
        (
            "idx_work_items_run_id",
            format!("CREATE INDEX IF NOT EXISTS idx_work_items_run_id ON {schema}.work_items (run_id)"),
        ),
        (
            "idx_work_items_source",
            format!(
                "CREATE INDEX IF NOT EXISTS idx_work_items_source ON {schema}.work_items (source_system, source_name)"
            ),
        ),
    ] {
        tracing::debug!(index = name, "ensuring index");
        sqlx::query(&ddl).execute(pool).await.map_err(crate::pg_err)?;
    }

    let create_heartbeats = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {schema}.worker_heartbeats (
            worker_id TEXT PRIMARY KEY,
            hostname TEXT NOT NULL,
            pid INTEGER NOT NULL,
            started_at TIMESTAMPTZ NOT NULL,
            last_heartbeat_at TIMESTAMPTZ NOT NULL,
            items_processed BIGINT NOT NULL DEFAULT 0,
            items_succeeded BIGINT NOT NULL DEFAULT 0,
            items_failed BIGINT NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            current_work_item_id UUID
        )
        "#
    );
    sqlx::query(&create_heartbeats).execute(pool).await.map_err(crate::pg_err)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("ingest").is_ok());
        assert!(validate_identifier("ingest_v2").is_ok());
    }

    #[test]
    fn rejects_reserved_words() {
        assert!(validate_identifier("select").is_err());
    }

    #[test]
    fn rejects_non_alnum() {
        assert!(validate_identifier("ingest; DROP TABLE x;--").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1ingest").is_err());
    }

    #[test]
    fn rejects_overlong() {
        let long = "a".repeat(64);
        assert!(validate_identifier(&long).is_err());
    }
}
