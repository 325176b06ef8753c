use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{WorkItemId, WorkerId};

/// Lifecycle states of a work item. Terminal states are `Completed`,
/// `Failed` and `Skipped`; `Pending` and `InProgress` are transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl WorkItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Completed | WorkItemStatus::Failed | WorkItemStatus::Skipped
        )
    }
}

/// Either a plain request descriptor (ingest work) or an LLM job payload.
/// Both sides of the two-tier queue model share the same row shape; this
/// enum is how a single `work_items` table carries either one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPayload {
    Fetch {
        request_uri: String,
        request_method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_headers: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_body: Option<Value>,
    },
    Interrogation {
        interrogation_key: String,
        input_json: Value,
    },
}

/// Request to enqueue a new work item. Distinct from `WorkItem` because the
/// store assigns `work_item_id`, `status`, `attempt`, and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub source_system: String,
    pub source_name: String,
    pub resource_type: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub payload: WorkPayload,
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<WorkItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<i32>,
}

impl NewWorkItem {
    /// `source_system:source_name:resource_type:resource_id[:variant]`, the
    /// deterministic key the store uses to dedupe `enqueue` calls.
    pub fn dedupe_key(&self) -> String {
        dedupe_key(
            &self.source_system,
            &self.source_name,
            &self.resource_type,
            &self.resource_id,
            self.variant.as_deref(),
        )
    }
}

/// Maximum length (in UTF-8 bytes, a conservative proxy for code units) a
/// dedupe key may occupy; enforced by stores at enqueue time.
pub const DEDUPE_KEY_MAX_LEN: usize = 800;

pub fn dedupe_key(
    source_system: &str,
    source_name: &str,
    resource_type: &str,
    resource_id: &str,
    variant: Option<&str>,
) -> String {
    let mut key = format!("{source_system}:{source_name}:{resource_type}:{resource_id}");
    if let Some(variant) = variant {
        key.push(':');
        key.push_str(variant);
    }
    key
}

/// A durably-stored unit of work, as returned by the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub work_item_id: WorkItemId,
    pub source_system: String,
    pub source_name: String,
    pub resource_type: String,
    pub resource_id: String,
    pub variant: Option<String>,
    pub dedupe_key: String,
    pub payload: WorkPayload,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub run_id: Option<String>,
    pub discovered_from: Option<WorkItemId>,
    pub rank: Option<i32>,
    pub status: WorkItemStatus,
    pub attempt: i32,
    pub last_error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<WorkerId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Filter shared by `claim_one`'s eligibility predicate and `reset_for_recrawl`.
#[derive(Debug, Clone, Default)]
pub struct RecrawlFilter {
    pub source_system: Option<String>,
    pub source_name: Option<String>,
    pub resource_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
}

/// Outcome of a single execution attempt, one row per claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: crate::ids::RunId,
    pub work_item_id: WorkItemId,
    pub worker_id: WorkerId,
    pub model_identity: Option<String>,
    pub options_json: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub metrics_json: Option<Value>,
    pub error_text: Option<String>,
}

/// Reference to a written artifact, as handed back by an `ArtifactSink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub lake_uri: String,
    pub content_sha256: String,
    pub byte_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Active,
    Idle,
    Paused,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    pub hostname: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub items_processed: i64,
    pub items_succeeded: i64,
    pub items_failed: i64,
    pub status: WorkerStatus,
    pub current_work_item_id: Option<WorkItemId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_key_omits_variant_when_absent() {
        let item = NewWorkItem {
            source_system: "wiki".into(),
            source_name: "enwiki".into(),
            resource_type: "page".into(),
            resource_id: "42".into(),
            variant: None,
            payload: WorkPayload::Fetch {
                request_uri: "https://example.org/42".into(),
                request_method: "GET".into(),
                request_headers: None,
                request_body: None,
            },
            priority: 0,
            run_id: None,
            discovered_from: None,
            rank: None,
        };
        assert_eq!(item.dedupe_key(), "wiki:enwiki:page:42");
    }

    #[test]
    fn dedupe_key_distinguishes_variants() {
        let raw = dedupe_key("wiki", "enwiki", "page", "42", Some("raw"));
        let html = dedupe_key("wiki", "enwiki", "page", "42", Some("html"));
        assert_ne!(raw, html);
    }

    #[test]
    fn terminal_states() {
        assert!(WorkItemStatus::Completed.is_terminal());
        assert!(WorkItemStatus::Failed.is_terminal());
        assert!(WorkItemStatus::Skipped.is_terminal());
        assert!(!WorkItemStatus::Pending.is_terminal());
        assert!(!WorkItemStatus::InProgress.is_terminal());
    }
}
