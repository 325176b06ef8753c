//! Data model, traits and shared logic for a durable, lease-based work
//! queue and worker pool. This crate has no I/O: `queue-postgres` and
//! `queue-ledger` provide the `sqlx`-backed implementations of the traits
//! declared here, `queue-runner` drives them, and `queue-testing` provides
//! in-memory implementations for unit tests.

pub mod artifact;
pub mod backoff;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod ids;
pub mod ledger;
pub mod model;
pub mod store;
pub mod worker_registry;

pub use artifact::ArtifactSink;
pub use config::RunnerConfig;
pub use discovery::{DiscoveryHook, NoDiscovery};
pub use error::QueueError;
pub use handler::{
    ArtifactDraft, FailureKind, Handler, HandlerOutcome, HandlerResult, RunContext,
};
pub use ids::{ArtifactId, RunId, WorkItemId, WorkerId};
pub use ledger::RunLedger;
pub use model::{
    ArtifactRef, NewWorkItem, QueueStats, RecrawlFilter, RunRecord, RunStatus, WorkItem,
    WorkItemStatus, WorkPayload, WorkerHeartbeat, WorkerStatus,
};
pub use store::StateStore;
pub use worker_registry::WorkerRegistry;
