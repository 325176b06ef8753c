//! `sqlx`/Postgres implementations of the `StateStore` and `WorkerRegistry`
//! traits declared in `queue-core`.

pub mod schema;
pub mod state_store;
pub mod worker_registry;

pub use schema::{ensure_schema, validate_identifier};
pub use state_store::PgStateStore;
pub use worker_registry::PgWorkerRegistry;

/// `QueueError` carries no `sqlx` variant (`queue-core` has no database
/// dependency), so every `sqlx::Error` crossing a trait method boundary is
/// folded into `QueueError::Backend` through here instead of `#[from]`.
pub(crate) fn pg_err(e: sqlx::Error) -> queue_core::QueueError {
    queue_core::QueueError::Backend(e.into())
}
