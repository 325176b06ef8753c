use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::QueueError;
use crate::ids::{ArtifactId, RunId, WorkItemId, WorkerId};
use crate::model::{ArtifactRef, RunStatus};

/// Records one row per execution attempt, linked to the artifacts it
/// produced. `start_run` / `finish_run` bracket a `ConcurrentRunner`
/// worker's call into a `Handler`.
#[async_trait]
pub trait RunLedger: Send + Sync {
    async fn start_run(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        model_identity: Option<&str>,
        options: Option<Value>,
    ) -> Result<RunId, QueueError>;

    /// Idempotent: finalizing an already-finished run is a no-op.
    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        metrics: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), QueueError>;

    async fn attach_artifact(
        &self,
        run_id: RunId,
        artifact: &ArtifactRef,
        artifact_type: &str,
        mime: &str,
    ) -> Result<ArtifactId, QueueError>;

    /// Optional many-to-many link for evidence bundles shared across runs.
    async fn link_run_to_bundle(&self, run_id: RunId, bundle_id: Uuid) -> Result<(), QueueError>;
}
