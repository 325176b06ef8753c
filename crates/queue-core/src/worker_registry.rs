use async_trait::async_trait;

use crate::error::QueueError;
use crate::ids::WorkerId;
use crate::model::WorkerHeartbeat;

/// Tracks worker liveness. `upsert_heartbeat` must be a single statement so
/// that concurrent heartbeats from a restarted worker never duplicate a row.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn upsert_heartbeat(&self, heartbeat: WorkerHeartbeat) -> Result<(), QueueError>;

    /// Workers whose `last_heartbeat_at` is within `timeout_seconds` of now.
    async fn list_active(&self, timeout_seconds: i64) -> Result<Vec<WorkerHeartbeat>, QueueError>;

    async fn remove(&self, worker_id: &WorkerId) -> Result<(), QueueError>;
}
