//! Run ledger and content-addressed artifact storage: the `RunLedger` and
//! `ArtifactSink` implementations from `queue-core`.

pub mod artifact_sink;
pub mod run_ledger;
pub mod schema;

pub use artifact_sink::LakeArtifactSink;
pub use run_ledger::PgRunLedger;

/// Folds a `sqlx::Error` into `QueueError::Backend`; `queue-core` carries no
/// `sqlx` dependency so there is no `#[from]` to reach for at the call site.
pub(crate) fn pg_err(e: sqlx::Error) -> queue_core::QueueError {
    queue_core::QueueError::Backend(e.into())
}
