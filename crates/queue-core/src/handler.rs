use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::ids::{RunId, WorkItemId, WorkerId};
use crate::model::WorkItem;
use crate::store::StateStore;

/// Whether a handler failure should be retried. Mirrors the two-variant
/// shape used throughout the job-queue framework this crate is grounded on:
/// failures are either worth another attempt or they are not, and that
/// decision is made once, by the handler, rather than re-derived from the
/// error's type at every layer above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    NonRetryable,
}

/// One artifact a handler wants persisted through the `ArtifactSink`, prior
/// to the work item being marked complete.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub artifact_type: String,
    pub content: Vec<u8>,
    pub mime: String,
}

impl ArtifactDraft {
    pub fn new(artifact_type: impl Into<String>, content: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            artifact_type: artifact_type.into(),
            content,
            mime: mime.into(),
        }
    }
}

/// A value a handler wants a domain-specific collaborator to persist
/// (e.g. extracted entities). The runner passes these through untouched;
/// this crate has no opinion on their shape.
pub type DomainWrite = Value;

/// What a `Handler` reports back to the runner after attempting one item.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Succeeded {
        output: Option<Value>,
        artifacts: Vec<ArtifactDraft>,
        domain_writes: Vec<DomainWrite>,
    },
    Failed {
        kind: FailureKind,
        error_message: String,
        /// An upstream `Retry-After` hint, in seconds, when the failure was
        /// a throttling response.
        retry_after_seconds: Option<u64>,
        artifacts: Vec<ArtifactDraft>,
    },
    Skipped {
        reason: String,
    },
}

/// The full result of invoking a `Handler` once.
#[derive(Debug, Clone)]
pub struct HandlerResult {
    pub outcome: HandlerOutcome,
    pub metrics: Option<Value>,
}

impl HandlerResult {
    pub fn succeeded(output: Option<Value>, artifacts: Vec<ArtifactDraft>) -> Self {
        Self {
            outcome: HandlerOutcome::Succeeded {
                output,
                artifacts,
                domain_writes: Vec::new(),
            },
            metrics: None,
        }
    }

    pub fn failed(kind: FailureKind, error_message: impl Into<String>) -> Self {
        Self {
            outcome: HandlerOutcome::Failed {
                kind,
                error_message: error_message.into(),
                retry_after_seconds: None,
                artifacts: Vec::new(),
            },
            metrics: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: HandlerOutcome::Skipped {
                reason: reason.into(),
            },
            metrics: None,
        }
    }
}

/// Carried into a `Handler` invocation. Gives the handler just enough
/// access to the owning run to renew its lease on long work; it cannot
/// reach into the store to mutate item state directly, matching the
/// component contract that all state transitions flow through the runner.
pub struct RunContext {
    store: Arc<dyn StateStore>,
    pub work_item_id: WorkItemId,
    pub worker_id: WorkerId,
    pub run_id: RunId,
    pub lease_seconds: i64,
    pub dry_run: bool,
}

impl RunContext {
    pub fn new(
        store: Arc<dyn StateStore>,
        work_item_id: WorkItemId,
        worker_id: WorkerId,
        run_id: RunId,
        lease_seconds: i64,
        dry_run: bool,
    ) -> Self {
        Self {
            store,
            work_item_id,
            worker_id,
            run_id,
            lease_seconds,
            dry_run,
        }
    }

    /// Extends this item's lease. Handlers performing long-running fetches
    /// or model calls should call this periodically; a failed renewal means
    /// ownership has already been lost and the handler should stop.
    pub async fn renew_lease(&self) -> bool {
        match self
            .store
            .renew_lease(self.work_item_id, &self.worker_id, self.lease_seconds)
            .await
        {
            Ok(renewed) => renewed,
            Err(err) => {
                warn!(work_item_id = %self.work_item_id, error = %err, "lease renewal failed");
                false
            }
        }
    }
}

/// A pluggable unit of work: given a claimed item, produce a result. The
/// runner is the sole caller; a handler never touches the state store.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, item: &WorkItem, ctx: &RunContext) -> HandlerResult;
}
