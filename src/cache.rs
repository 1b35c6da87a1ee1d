//! Per-user JSON snapshots of the submission list, used by the standalone
//! notifier to diff against the previous run.
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::model::{is_service_user_id, Submission};

#[derive(Debug, Clone)]
pub struct SnapshotCache {
    dir: PathBuf,
}

impl SnapshotCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, atcoder_id: &str) -> Result<PathBuf> {
        if !is_service_user_id(atcoder_id) {
            bail!("refusing to cache snapshot for user id {atcoder_id:?}");
        }
        Ok(self.dir.join("atcoder").join(format!("{atcoder_id}.json")))
    }

    /// Previous snapshot, empty when the user has never been cached.
    pub async fn load(&self, atcoder_id: &str) -> Result<Vec<Submission>> {
        let path = self.snapshot_path(atcoder_id)?;
        read_snapshot(&path).await
    }

    /// Replace the stored snapshot with `latest` and return the previous one.
    pub async fn swap(&self, atcoder_id: &str, latest: &[Submission]) -> Result<Vec<Submission>> {
        let path = self.snapshot_path(atcoder_id)?;
        let previous = read_snapshot(&path).await?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let body = serde_json::to_vec(latest)?;
        fs::write(&path, body)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(path = %path.display(), entries = latest.len(), "wrote snapshot");
        Ok(previous)
    }
}

async fn read_snapshot(path: &Path) -> Result<Vec<Submission>> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt snapshot {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}
