use async_trait::async_trait;

use crate::error::QueueError;
use crate::ids::RunId;
use crate::model::ArtifactRef;

/// Write-once, content-addressed artifact storage. A call to `write` either
/// fully succeeds (both the lake copy and any database mirror land) or
/// returns an error; partial writes must never be observable to readers.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write(
        &self,
        run_id: RunId,
        artifact_type: &str,
        content: &[u8],
        mime: &str,
    ) -> Result<ArtifactRef, QueueError>;
}
