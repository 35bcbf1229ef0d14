use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{Error, Result};

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store the file and return a URL it can be fetched from.
    async fn upload(&self, file: &Path) -> Result<String>;
}

pub fn object_key(file_name: &str, timestamp_ms: i64) -> String {
    format!("reports/{}_{}", timestamp_ms, file_name)
}

/// Object storage backed by a directory on disk.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, file: &Path) -> Result<String> {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Storage(format!("not a file: {}", file.display())))?;

        let key = object_key(file_name, Utc::now().timestamp_millis());
        let target = self.root.join(&key);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(e.to_string()))?;
        }
        tokio::fs::copy(file, &target)
            .await
            .map_err(|e| Error::Storage(e.to_string()))?;

        let absolute = tokio::fs::canonicalize(&target).await.unwrap_or(target);
        debug!(key, "uploaded report image");
        Ok(format!("file://{}", absolute.display()))
    }
}
