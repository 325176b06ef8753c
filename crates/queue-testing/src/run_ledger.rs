use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use queue_core::{ArtifactId, ArtifactRef, QueueError, RunId, RunRecord, RunStatus, WorkItemId, WorkerId};
use queue_core::RunLedger;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryRunLedger {
    runs: Mutex<HashMap<RunId, RunRecord>>,
    artifacts: Mutex<HashMap<ArtifactId, (RunId, ArtifactRef, String, String)>>,
    bundle_links: Mutex<Vec<(RunId, Uuid)>>,
}

impl InMemoryRunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_run(&self, run_id: RunId) -> Option<RunRecord> {
        self.runs.lock().await.get(&run_id).cloned()
    }

    /// All runs recorded so far, in no particular order. Lets a test find
    /// "the run" without having to thread a `run_id` back out of whatever
    /// started it.
    pub async fn all_runs(&self) -> Vec<RunRecord> {
        self.runs.lock().await.values().cloned().collect()
    }

    pub async fn artifacts_for_run(&self, run_id: RunId) -> Vec<ArtifactRef> {
        self.artifacts
            .lock()
            .await
            .values()
            .filter(|(owner, ..)| *owner == run_id)
            .map(|(_, artifact, ..)| artifact.clone())
            .collect()
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn start_run(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        model_identity: Option<&str>,
        options: Option<Value>,
    ) -> Result<RunId, QueueError> {
        let run_id = RunId::new();
        let record = RunRecord {
            run_id,
            work_item_id,
            worker_id: worker_id.clone(),
            model_identity: model_identity.map(|s| s.to_string()),
            options_json: options,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            metrics_json: None,
            error_text: None,
        };
        self.runs.lock().await.insert(run_id, record);
        Ok(run_id)
    }

    async fn finish_run(
        &self,
        run_id: RunId,
        status: RunStatus,
        metrics: Option<Value>,
        error: Option<&str>,
    ) -> Result<(), QueueError> {
        let mut runs = self.runs.lock().await;
        let Some(record) = runs.get_mut(&run_id) else {
            return Ok(());
        };
        if record.status != RunStatus::Running {
            return Ok(());
        }
        record.status = status;
        record.ended_at = Some(Utc::now());
        record.metrics_json = metrics;
        record.error_text = error.map(|s| s.to_string());
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
        self.artifacts.lock().await.insert(
            artifact_id,
            (run_id, artifact.clone(), artifact_type.to_string(), mime.to_string()),
        );
        Ok(artifact_id)
    }

    async fn link_run_to_bundle(&self, run_id: RunId, bundle_id: Uuid) -> Result<(), QueueError> {
        let mut links = self.bundle_links.lock().await;
        if !links.iter().any(|(r, b)| *r == run_id && *b == bundle_id) {
            links.push((run_id, bundle_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finish_run_is_idempotent() {
        let ledger = InMemoryRunLedger::new();
        let worker_id = WorkerId::new("w1");
        let run_id = ledger
            .start_run(WorkItemId::new(), &worker_id, None, None)
            .await
            .unwrap();

        ledger
            .finish_run(run_id, RunStatus::Succeeded, None, None)
            .await
            .unwrap();
        // A second finalize must not clobber the first outcome.
        ledger
            .finish_run(run_id, RunStatus::Failed, None, Some("late error"))
            .await
            .unwrap();

        let record = ledger.get_run(run_id).await.unwrap();
        assert_eq!(record.status, RunStatus::Succeeded);
        assert!(record.error_text.is_none());
    }

    #[tokio::test]
    async fn attach_artifact_is_queryable_by_run() {
        let ledger = InMemoryRunLedger::new();
        let worker_id = WorkerId::new("w1");
        let run_id = ledger
            .start_run(WorkItemId::new(), &worker_id, None, None)
            .await
            .unwrap();

        let artifact = ArtifactRef {
            lake_uri: "2026/07/30/foo/output.json".into(),
            content_sha256: "deadbeef".into(),
            byte_count: 4,
        };
        ledger
            .attach_artifact(run_id, &artifact, "output", "application/json")
            .await
            .unwrap();

        let artifacts = ledger.artifacts_for_run(run_id).await;
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].content_sha256, "deadbeef");
    }
}
