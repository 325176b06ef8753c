use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use queue_core::{ArtifactSink, ArtifactRef, QueueError, RunId};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Write-once, content-addressed artifact storage rooted at `base_dir`.
/// Layout: `base_dir/YYYY/MM/DD/<run_id>/<artifact_type>.<ext>`, matching
/// the lake path convention. A write either lands the full file or returns
/// an error; there is no partial-file state visible to readers because the
/// content is written to a temp path and renamed into place.
pub struct LakeArtifactSink {
    base_dir: PathBuf,
}

impl LakeArtifactSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn extension_for(mime: &str) -> &'static str {
        match mime {
            "application/json" => "json",
            "text/plain" | "text/markdown" => "txt",
            "text/html" => "html",
            _ => "bin",
        }
    }

    fn relative_path(run_id: RunId, artifact_type: &str, mime: &str) -> String {
        let now = Utc::now();
        format!(
            "{}/{}/{}.{}",
            now.format("%Y/%m/%d"),
            run_id,
            artifact_type,
            Self::extension_for(mime)
        )
    }
}

#[async_trait]
impl ArtifactSink for LakeArtifactSink {
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

        let relative = Self::relative_path(run_id, artifact_type, mime);
        let full_path = self.base_dir.join(&relative);
        let parent = full_path.parent().ok_or_else(|| {
            QueueError::Backend(anyhow::anyhow!("artifact path {relative} has no parent"))
        })?;

        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| QueueError::Backend(anyhow::anyhow!(e)))?;

        let tmp_path = tmp_path_for(&full_path);
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| QueueError::Backend(anyhow::anyhow!(e)))?;
        tokio::fs::rename(&tmp_path, &full_path)
            .await
            .map_err(|e| QueueError::Backend(anyhow::anyhow!(e)))?;

        debug!(run_id = %run_id, artifact_type, bytes = byte_count, "artifact written");

        Ok(ArtifactRef {
            lake_uri: relative,
            content_sha256,
            byte_count,
        })
    }
}

fn tmp_path_for(final_path: &Path) -> PathBuf {
    let mut tmp = final_path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_computes_hash_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LakeArtifactSink::new(dir.path());
        let run_id = RunId::new();
        let artifact = sink
            .write(run_id, "evidence", b"hello world", "text/plain")
            .await
            .unwrap();

        assert_eq!(artifact.byte_count, 11);
        assert!(artifact.lake_uri.ends_with("evidence.txt"));
        assert!(artifact.lake_uri.contains(&run_id.to_string()));

        let on_disk = tokio::fs::read(dir.path().join(&artifact.lake_uri))
            .await
            .unwrap();
        assert_eq!(on_disk, b"hello world");
    }

    #[tokio::test]
    async fn identical_content_hashes_identically() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LakeArtifactSink::new(dir.path());
        let a = sink
            .write(RunId::new(), "output", b"same bytes", "application/json")
            .await
            .unwrap();
        let b = sink
            .write(RunId::new(), "output", b"same bytes", "application/json")
            .await
            .unwrap();
        assert_eq!(a.content_sha256, b.content_sha256);
    }
}
