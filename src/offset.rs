use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Durable "last handled update" marker
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Stored offset, or 0 when nothing has been stored yet
    async fn load(&self) -> u64;
    async fn save(&self, update_id: u64) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct OffsetFile {
    #[serde(rename = "lastUpdateId", default)]
    last_update_id: u64,
}

/// `{"lastUpdateId": N}` on disk, replaced atomically on every save
pub struct JsonOffsetStore {
    path: PathBuf,
}

impl JsonOffsetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl OffsetStore for JsonOffsetStore {
    async fn load(&self) -> u64 {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) => {
                debug!("No stored offset at {}: {}", self.path.display(), e);
                return 0;
            }
        };
        match serde_json::from_str::<OffsetFile>(&content) {
            Ok(file) => file.last_update_id,
            Err(e) => {
                warn!("Ignoring unreadable offset file {}: {}", self.path.display(), e);
                0
            }
        }
    }

    async fn save(&self, update_id: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let body = serde_json::to_string(&OffsetFile {
            last_update_id: update_id,
        })?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, body)
            .await
            .with_context(|| format!("Failed to write offset file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace offset file: {}", self.path.display()))?;
        Ok(())
    }
}
