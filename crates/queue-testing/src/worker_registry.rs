use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use queue_core::{QueueError, WorkerHeartbeat, WorkerId, WorkerRegistry};
use tokio::sync::Mutex;

#[derive(Default)]
pub struct InMemoryWorkerRegistry {
    workers: Mutex<HashMap<WorkerId, WorkerHeartbeat>>,
}

impl InMemoryWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRegistry for InMemoryWorkerRegistry {
    async fn upsert_heartbeat(&self, heartbeat: WorkerHeartbeat) -> Result<(), QueueError> {
        let mut workers = self.workers.lock().await;
        workers.insert(heartbeat.worker_id.clone(), heartbeat);
        Ok(())
    }

    async fn list_active(&self, timeout_seconds: i64) -> Result<Vec<WorkerHeartbeat>, QueueError> {
        let workers = self.workers.lock().await;
        let cutoff = Utc::now() - chrono::Duration::seconds(timeout_seconds);
        Ok(workers
            .values()
            .filter(|w| w.last_heartbeat_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn remove(&self, worker_id: &WorkerId) -> Result<(), QueueError> {
        let mut workers = self.workers.lock().await;
        workers.remove(worker_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::WorkerStatus;

    fn heartbeat(worker_id: &str, last_heartbeat_at: chrono::DateTime<Utc>) -> WorkerHeartbeat {
        WorkerHeartbeat {
            worker_id: WorkerId::new(worker_id),
            hostname: "test-host".into(),
            pid: 1,
            started_at: Utc::now(),
            last_heartbeat_at,
            items_processed: 0,
            items_succeeded: 0,
            items_failed: 0,
            status: WorkerStatus::Active,
            current_work_item_id: None,
        }
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let registry = InMemoryWorkerRegistry::new();
        registry.upsert_heartbeat(heartbeat("w1", Utc::now())).await.unwrap();
        registry.upsert_heartbeat(heartbeat("w1", Utc::now())).await.unwrap();
        let active = registry.list_active(60).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn list_active_excludes_stale_heartbeats() {
        let registry = InMemoryWorkerRegistry::new();
        registry
            .upsert_heartbeat(heartbeat("fresh", Utc::now()))
            .await
            .unwrap();
        registry
            .upsert_heartbeat(heartbeat("stale", Utc::now() - chrono::Duration::seconds(120)))
            .await
            .unwrap();

        let active = registry.list_active(30).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].worker_id, WorkerId::new("fresh"));
    }

    #[tokio::test]
    async fn remove_drops_the_row() {
        let registry = InMemoryWorkerRegistry::new();
        registry.upsert_heartbeat(heartbeat("w1", Utc::now())).await.unwrap();
        registry.remove(&WorkerId::new("w1")).await.unwrap();
        assert!(registry.list_active(60).await.unwrap().is_empty());
    }
}
