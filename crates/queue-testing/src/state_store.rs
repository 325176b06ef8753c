use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use queue_core::{
    backoff, NewWorkItem, QueueError, QueueStats, RecrawlFilter, StateStore, WorkItem,
    WorkItemId, WorkItemStatus, WorkerId,
};
use tokio::sync::Mutex;

/// An in-memory `StateStore` for unit tests, modeled on the `InMemoryStore`
/// pattern used for the persistence-layer tests in the framework this crate
/// is built against. Not meant for production: everything lives in one
/// `Mutex<HashMap>`, so there is no cross-process sharing.
#[derive(Default)]
pub struct InMemoryStateStore {
    items: Mutex<HashMap<WorkItemId, WorkItem>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn eligible(item: &WorkItem, now: chrono::DateTime<Utc>) -> bool {
        match item.status {
            WorkItemStatus::Pending => item.next_retry_at.map(|t| t <= now).unwrap_or(true),
            WorkItemStatus::InProgress => item.lease_expires_at.map(|t| t < now).unwrap_or(false),
            _ => false,
        }
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn enqueue(&self, new_item: NewWorkItem) -> Result<bool, QueueError> {
        let dedupe_key = new_item.dedupe_key();
        let mut items = self.items.lock().await;
        if items.values().any(|i| i.dedupe_key == dedupe_key) {
            return Ok(false);
        }
        let now = Utc::now();
        let item = WorkItem {
            work_item_id: WorkItemId::new(),
            source_system: new_item.source_system,
            source_name: new_item.source_name,
            resource_type: new_item.resource_type,
            resource_id: new_item.resource_id,
            variant: new_item.variant,
            dedupe_key,
            payload: new_item.payload,
            priority: new_item.priority,
            created_at: now,
            updated_at: now,
            run_id: new_item.run_id,
            discovered_from: new_item.discovered_from,
            rank: new_item.rank,
            status: WorkItemStatus::Pending,
            attempt: 0,
            last_error: None,
            next_retry_at: None,
            claimed_by: None,
            claimed_at: None,
            lease_expires_at: None,
        };
        items.insert(item.work_item_id, item);
        Ok(true)
    }

    async fn claim_one(
        &self,
        worker_id: &WorkerId,
        lease_seconds: i64,
        source_filter: Option<&str>,
    ) -> Result<Option<WorkItem>, QueueError> {
        let mut items = self.items.lock().await;
        let now = Utc::now();

        let mut candidates: Vec<WorkItemId> = items
            .values()
            .filter(|item| Self::eligible(item, now))
            .filter(|item| {
                source_filter
                    .map(|source| item.source_system == source)
                    .unwrap_or(true)
            })
            .map(|item| item.work_item_id)
            .collect();

        candidates.sort_by_key(|id| {
            let item = &items[id];
            (item.priority, item.created_at)
        });

        let Some(chosen) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let item = items.get_mut(&chosen).unwrap();
        item.status = WorkItemStatus::InProgress;
        item.claimed_by = Some(worker_id.clone());
        item.claimed_at = Some(now);
        item.lease_expires_at = Some(now + chrono::Duration::seconds(lease_seconds));
        item.updated_at = now;
        item.attempt += 1;
        Ok(Some(item.clone()))
    }

    async fn renew_lease(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        lease_seconds: i64,
    ) -> Result<bool, QueueError> {
        let mut items = self.items.lock().await;
        let Some(item) = items.get_mut(&work_item_id) else {
            return Ok(false);
        };
        if item.status != WorkItemStatus::InProgress || item.claimed_by.as_ref() != Some(worker_id) {
            return Ok(false);
        }
        item.lease_expires_at = Some(Utc::now() + chrono::Duration::seconds(lease_seconds));
        item.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete(&self, work_item_id: WorkItemId, worker_id: &WorkerId) -> Result<bool, QueueError> {
        let mut items = self.items.lock().await;
        let Some(item) = items.get_mut(&work_item_id) else {
            return Ok(false);
        };
        if item.status != WorkItemStatus::InProgress || item.claimed_by.as_ref() != Some(worker_id) {
            return Ok(false);
        }
        item.status = WorkItemStatus::Completed;
        item.claimed_by = None;
        item.claimed_at = None;
        item.lease_expires_at = None;
        item.last_error = None;
        item.updated_at = Utc::now();
        Ok(true)
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
        let mut items = self.items.lock().await;
        let Some(item) = items.get_mut(&work_item_id) else {
            return Ok(false);
        };
        if item.status != WorkItemStatus::InProgress || item.claimed_by.as_ref() != Some(worker_id) {
            return Ok(false);
        }

        item.claimed_by = None;
        item.claimed_at = None;
        item.lease_expires_at = None;
        item.last_error = Some(error.to_string());
        item.updated_at = Utc::now();

        if retryable && item.attempt < max_retries {
            let delay = backoff_hint
                .unwrap_or_else(|| backoff::exponential_with_jitter(item.attempt.max(1) as u32, 2.0, 300.0));
            item.status = WorkItemStatus::Pending;
            item.next_retry_at = Some(
                Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(300)),
            );
        } else {
            item.status = WorkItemStatus::Failed;
        }
        Ok(true)
    }

    async fn recover_expired_leases(&self) -> Result<u64, QueueError> {
        let mut items = self.items.lock().await;
        let now = Utc::now();
        let mut recovered = 0u64;
        for item in items.values_mut() {
            if item.status == WorkItemStatus::InProgress
                && item.lease_expires_at.map(|t| t < now).unwrap_or(false)
            {
                item.status = WorkItemStatus::Pending;
                item.claimed_by = None;
                item.claimed_at = None;
                item.lease_expires_at = None;
                item.updated_at = now;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn exists(&self, dedupe_key: &str) -> Result<bool, QueueError> {
        let items = self.items.lock().await;
        Ok(items.values().any(|i| i.dedupe_key == dedupe_key))
    }

    async fn get(&self, work_item_id: WorkItemId) -> Result<Option<WorkItem>, QueueError> {
        let items = self.items.lock().await;
        Ok(items.get(&work_item_id).cloned())
    }

    async fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        let items = self.items.lock().await;
        let mut stats = QueueStats::default();
        for item in items.values() {
            match item.status {
                WorkItemStatus::Pending => stats.pending += 1,
                WorkItemStatus::InProgress => stats.in_progress += 1,
                WorkItemStatus::Completed => stats.completed += 1,
                WorkItemStatus::Failed => stats.failed += 1,
                WorkItemStatus::Skipped => stats.skipped += 1,
            }
        }
        Ok(stats)
    }

    async fn reset_for_recrawl(&self, filter: &RecrawlFilter) -> Result<u64, QueueError> {
        let mut items = self.items.lock().await;
        let mut affected = 0u64;
        for item in items.values_mut() {
            if item.status != WorkItemStatus::Completed {
                continue;
            }
            if let Some(source_system) = &filter.source_system {
                if &item.source_system != source_system {
                    continue;
                }
            }
            if let Some(source_name) = &filter.source_name {
                if &item.source_name != source_name {
                    continue;
                }
            }
            if let Some(resource_type) = &filter.resource_type {
                if &item.resource_type != resource_type {
                    continue;
                }
            }
            item.status = WorkItemStatus::Pending;
            item.attempt = 0;
            item.last_error = None;
            item.next_retry_at = None;
            item.updated_at = Utc::now();
            affected += 1;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_core::WorkPayload;

    fn fetch_item(resource_id: &str, priority: i32) -> NewWorkItem {
        NewWorkItem {
            source_system: "wiki".into(),
            source_name: "enwiki".into(),
            resource_type: "page".into(),
            resource_id: resource_id.into(),
            variant: None,
            payload: WorkPayload::Fetch {
                request_uri: format!("https://example.org/{resource_id}"),
                request_method: "GET".into(),
                request_headers: None,
                request_body: None,
            },
            priority,
            run_id: None,
            discovered_from: None,
            rank: None,
        }
    }

    #[tokio::test]
    async fn enqueue_dedupes() {
        let store = InMemoryStateStore::new();
        assert!(store.enqueue(fetch_item("1", 0)).await.unwrap());
        assert!(!store.enqueue(fetch_item("1", 0)).await.unwrap());
    }

    #[tokio::test]
    async fn claim_respects_priority_then_fifo() {
        let store = InMemoryStateStore::new();
        store.enqueue(fetch_item("low-priority", 10)).await.unwrap();
        store.enqueue(fetch_item("high-priority", 1)).await.unwrap();

        let worker = WorkerId::new("w0");
        let claimed = store.claim_one(&worker, 60, None).await.unwrap().unwrap();
        assert_eq!(claimed.resource_id, "high-priority");
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable_and_bumps_attempt() {
        let store = InMemoryStateStore::new();
        store.enqueue(fetch_item("1", 0)).await.unwrap();
        let w1 = WorkerId::new("w1");
        let claimed = store.claim_one(&w1, 0, None).await.unwrap().unwrap();
        assert_eq!(claimed.attempt, 1);

        // lease_seconds = 0, so it is already expired.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let recovered = store.recover_expired_leases().await.unwrap();
        assert_eq!(recovered, 1);

        let w2 = WorkerId::new("w2");
        let reclaimed = store.claim_one(&w2, 60, None).await.unwrap().unwrap();
        assert_eq!(reclaimed.attempt, 2);
    }

    #[tokio::test]
    async fn fail_without_retries_left_is_terminal() {
        let store = InMemoryStateStore::new();
        store.enqueue(fetch_item("1", 0)).await.unwrap();
        let worker = WorkerId::new("w0");
        let claimed = store.claim_one(&worker, 60, None).await.unwrap().unwrap();

        let ok = store
            .fail(claimed.work_item_id, &worker, "boom", true, None, 0)
            .await
            .unwrap();
        assert!(ok);

        let item = store.get(claimed.work_item_id).await.unwrap().unwrap();
        assert_eq!(item.status, WorkItemStatus::Failed);
    }

    #[tokio::test]
    async fn complete_fails_when_ownership_lost() {
        let store = InMemoryStateStore::new();
        store.enqueue(fetch_item("1", 0)).await.unwrap();
        let w1 = WorkerId::new("w1");
        let claimed = store.claim_one(&w1, 60, None).await.unwrap().unwrap();

        let w2 = WorkerId::new("w2");
        let ok = store.complete(claimed.work_item_id, &w2).await.unwrap();
        assert!(!ok);
    }
}
