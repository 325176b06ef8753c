use async_trait::async_trait;
use serde_json::Value;

use crate::model::{NewWorkItem, WorkItem};

/// Post-success hook invoked by the runner after a handler succeeds.
/// Discovered items are enqueued through the same `StateStore::enqueue`
/// path as everything else, so dedupe applies automatically; a discovery
/// error is logged and does not fail the parent item.
#[async_trait]
pub trait DiscoveryHook: Send + Sync {
    async fn discover(&self, output: Option<&Value>, parent: &WorkItem) -> Vec<NewWorkItem>;
}

/// A `DiscoveryHook` that never discovers anything, used when
/// `RunnerConfig::enable_discovery` is false or no hook is configured.
pub struct NoDiscovery;

#[async_trait]
impl DiscoveryHook for NoDiscovery {
    async fn discover(&self, _output: Option<&Value>, _parent: &WorkItem) -> Vec<NewWorkItem> {
        Vec::new()
    }
}
