use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::ids::{WorkItemId, WorkerId};
use crate::model::{NewWorkItem, QueueStats, RecrawlFilter, WorkItem};

/// Durable queue backing store. Every method is a single atomic operation;
/// callers never see, and implementations never expose, an open
/// cross-method transaction. See `queue-postgres` for the `sqlx`-backed
/// implementation and `queue-testing` for an in-memory one used by tests.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Inserts `item` if no row shares its dedupe key. Returns `false`
    /// (not an error) when a duplicate already exists.
    async fn enqueue(&self, item: NewWorkItem) -> Result<bool, QueueError>;

    /// Atomically selects and claims the single highest-priority eligible
    /// row (pending-and-due, or in_progress-with-expired-lease), advancing
    /// `attempt` by one. Returns `None` when no row qualifies.
    async fn claim_one(
        &self,
        worker_id: &WorkerId,
        lease_seconds: i64,
        source_filter: Option<&str>,
    ) -> Result<Option<WorkItem>, QueueError>;

    /// Extends the lease on a row this worker still owns. Returns `false`
    /// if ownership was lost (another claim already happened).
    async fn renew_lease(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        lease_seconds: i64,
    ) -> Result<bool, QueueError>;

    /// Marks a row `completed`, clearing lease/claim fields. Returns
    /// `false` if ownership was lost.
    async fn complete(&self, work_item_id: WorkItemId, worker_id: &WorkerId) -> Result<bool, QueueError>;

    /// Records a failed attempt. If `retryable` and `attempt < max_retries`
    /// the row returns to `pending` with `next_retry_at` set from
    /// `backoff_hint` (or the store's own exponential-with-jitter schedule
    /// when no hint is given); otherwise it becomes terminally `failed`.
    /// Returns `false` if ownership was lost.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        work_item_id: WorkItemId,
        worker_id: &WorkerId,
        error: &str,
        retryable: bool,
        backoff_hint: Option<Duration>,
        max_retries: i32,
    ) -> Result<bool, QueueError>;

    /// Bulk-transitions every `in_progress` row whose lease has expired
    /// back to `pending`. Does not touch `attempt` (already advanced at
    /// claim time). Returns the number of rows recovered.
    async fn recover_expired_leases(&self) -> Result<u64, QueueError>;

    async fn exists(&self, dedupe_key: &str) -> Result<bool, QueueError>;

    async fn get(&self, work_item_id: WorkItemId) -> Result<Option<WorkItem>, QueueError>;

    async fn queue_stats(&self) -> Result<QueueStats, QueueError>;

    /// Bulk-transitions `completed` rows matching `filter` back to
    /// `pending` with `attempt` reset to zero. Returns the number of rows
    /// affected.
    async fn reset_for_recrawl(&self, filter: &RecrawlFilter) -> Result<u64, QueueError>;
}
