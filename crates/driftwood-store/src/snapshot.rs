//! Snapshot persistence
//!
//! Persists the store contents to a versioned JSON file so a restarted
//! daemon resumes with the same objects, finalizers and external names.

use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use driftwood_core::Resource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time copy of every stored resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Snapshot file format version
    pub version: u32,

    pub saved_at: DateTime<Utc>,

    /// Highest resource version handed out when the snapshot was taken
    pub revision: u64,

    /// Resources in key order
    pub resources: Vec<Resource>,
}

impl StoreSnapshot {
    pub fn new(revision: u64, resources: Vec<Resource>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            revision,
            resources,
        }
    }
}

/// Reads and writes snapshot files
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    /// Load the snapshot, `None` when no file exists yet
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !fs::try_exists(&self.path).await? {
            tracing::debug!(path = %self.path.display(), "Snapshot not found");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(StoreError::StateError(format!(
                "Snapshot version {} is newer than supported version {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        tracing::debug!(
            resources = snapshot.resources.len(),
            revision = snapshot.revision,
            "Loaded snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Save the snapshot, rotating the previous file to `.backup`
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).await?;
        }

        if fs::try_exists(&self.path).await? {
            let backup = self.backup_path();
            if fs::try_exists(&backup).await? {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&self.path, &backup).await?;
            tracing::debug!("Rotated snapshot backup");
        }

        let content = serde_json::to_string_pretty(snapshot)?;
        fs::write(&self.path, content).await?;

        tracing::debug!(
            resources = snapshot.resources.len(),
            path = %self.path.display(),
            "Saved snapshot"
        );
        Ok(())
    }
}
