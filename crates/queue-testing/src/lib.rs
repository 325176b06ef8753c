//! In-memory `StateStore`/`WorkerRegistry`/`ArtifactSink`/`RunLedger`
//! implementations for unit and integration tests. No I/O, no persistence
//! across process restarts; every type here is a thin `Mutex<HashMap<_>>`.

pub mod artifact_sink;
pub mod run_ledger;
pub mod state_store;
pub mod worker_registry;

pub use artifact_sink::InMemoryArtifactSink;
pub use run_ledger::InMemoryRunLedger;
pub use state_store::InMemoryStateStore;
pub use worker_registry::InMemoryWorkerRegistry;
