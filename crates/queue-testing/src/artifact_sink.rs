use std::collections::HashMap;

use async_trait::async_trait;
use queue_core::{ArtifactRef, ArtifactSink, QueueError, RunId};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

/// Keeps written bytes in memory instead of on disk, addressed the same way
/// `LakeArtifactSink` addresses its files, so tests can assert on content
/// without touching the filesystem.
#[derive(Default)]
pub struct InMemoryArtifactSink {
    written: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, lake_uri: &str) -> Option<Vec<u8>> {
        self.written.lock().await.get(lake_uri).cloned()
    }

    fn extension_for(mime: &str) -> &'static str {
        match mime {
            "application/json" => "json",
            "text/plain" | "text/markdown" => "txt",
            "text/html" => "html",
            _ => "bin",
        }
    }
}

#[async_trait]
impl ArtifactSink for InMemoryArtifactSink {
    async fn write(
        &self,
        run_id: RunId,
        artifact_type: &str,
        content: &[u8],
        mime: &str,
    ) -> Result<ArtifactRef, QueueError> {
        let mut hasher = Sha256::new();
        hasher.update(content);
        let content_sha256 = hex::encode(hasher.finalize());
        let byte_count = content.len() as u64;
        let lake_uri = format!("{run_id}/{artifact_type}.{}", Self::extension_for(mime));

        self.written
            .lock()
            .await
            .insert(lake_uri.clone(), content.to_vec());

        Ok(ArtifactRef {
            lake_uri,
            content_sha256,
            byte_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_get_round_trips() {
        let sink = InMemoryArtifactSink::new();
        let run_id = RunId::new();
        let artifact = sink
            .write(run_id, "evidence", b"hello", "text/plain")
            .await
            .unwrap();
        let stored = sink.get(&artifact.lake_uri).await.unwrap();
        assert_eq!(stored, b"hello");
    }
}
