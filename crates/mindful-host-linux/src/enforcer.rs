//! Policy-file enforcer

use async_trait::async_trait;
use chrono::{DateTime, Local};
use mindful_api::BlockedSet;
use mindful_host_api::{Enforcer, HostError, HostResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Content of the policy file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPolicy {
    pub blocked: BlockedSet,
    pub applied_at: DateTime<Local>,
}

/// Enforcer that publishes the blocked set as a JSON file.
///
/// Each application replaces the whole file through a rename, so a consumer
/// watching it always sees a complete set.
pub struct FileEnforcer {
    path: PathBuf,
}

impl FileEnforcer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the currently published policy, `None` if none was ever applied
    pub async fn current(&self) -> HostResult<Option<AppliedPolicy>> {
        read_applied_policy(&self.path).await
    }
}

/// Read a policy file, `None` if it does not exist
pub async fn read_applied_policy(path: &Path) -> HostResult<Option<AppliedPolicy>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HostError::EnforcementFailed(format!("corrupt policy file: {}", e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Enforcer for FileEnforcer {
    async fn apply_policy(&self, blocked: &BlockedSet) -> HostResult<()> {
        let policy = AppliedPolicy {
            blocked: blocked.clone(),
            applied_at: mindful_util::now(),
        };
        let bytes = serde_json::to_vec_pretty(&policy)
            .map_err(|e| HostError::Internal(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("policy");
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "Policy file written");
        info!(blocked = blocked.len(), "Policy applied");
        Ok(())
    }
}
