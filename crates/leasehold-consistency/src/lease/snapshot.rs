//! Point-in-time store snapshots
//!
//! A snapshot is written to a temporary sibling file, synced, and renamed
//! over the target, so a crash mid-write leaves the previous snapshot intact.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use leasehold_common::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::model::{FencingScope, Lease};
use super::store::{LeaseStore, MemoryLeaseStore, StoreError};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 2;

/// Serialized form of a [`MemoryLeaseStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub format_version: u32,
    pub taken_at: Timestamp,
    #[serde(default)]
    pub fencing_scope: FencingScope,
    pub leases: Vec<Lease>,
    /// Highest version assigned by the store
    #[serde(default)]
    pub version: u64,
    /// Highest fencing token issued in either scope
    #[serde(default)]
    pub global_token: u64,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            taken_at: 0,
            fencing_scope: FencingScope::Global,
            leases: Vec::new(),
            version: 0,
            global_token: 0,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `path` with `.tmp` appended to the full file name
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Replace `path` with `bytes` so that readers see either the old or the new
/// content, and the new content survives a crash once this returns.
pub(crate) async fn write_durably(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(io_error(parent))?;
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(io_error(&tmp))?;
    file.write_all(bytes).await.map_err(io_error(&tmp))?;
    file.sync_all().await.map_err(io_error(&tmp))?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(io_error(path))?;

    // Persist the rename itself. Not every platform can open a directory.
    if let Some(parent) = parent
        && let Ok(dir) = tokio::fs::File::open(parent).await
        && let Err(e) = dir.sync_all().await
    {
        debug!(path = %parent.display(), error = %e, "Directory sync skipped");
    }
    Ok(())
}

/// Read `path`, or `None` when it does not exist
pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, SnapshotError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

impl MemoryLeaseStore {
    /// Write the current state to `path`
    pub async fn save_snapshot(&self, path: &Path, now: Timestamp) -> Result<usize, SnapshotError> {
        let snapshot = self.snapshot(now);
        let count = snapshot.leases.len();
        let bytes = serde_json::to_vec_pretty(&snapshot)?;

        write_durably(path, &bytes).await?;

        info!(path = %path.display(), leases = count, "Lease store snapshot saved");
        Ok(count)
    }

    /// Replace the current state with the snapshot at `path`.
    ///
    /// A missing file is not an error; the store is left empty and `Ok(0)` is
    /// returned.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize, SnapshotError> {
        let Some(bytes) = read_optional(path).await? else {
            info!(path = %path.display(), "No lease store snapshot found, starting empty");
            return Ok(0);
        };

        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.fencing_scope != self.fencing_scope() {
            warn!(
                path = %path.display(),
                stored = %snapshot.fencing_scope,
                configured = %self.fencing_scope(),
                "Snapshot fencing scope differs from configuration"
            );
        }
        let count = snapshot.leases.len();
        self.restore(snapshot)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::fencing::FencingCounter;
    use leasehold_common::{FencingToken, HolderId, LockName};
    use std::time::Duration;

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("leases.json");
        let name = LockName::new("orders").unwrap();

        let store = MemoryLeaseStore::new();
        let token = store.next_token(&name).await.unwrap();
        let lease = Lease::new(
            name.clone(),
            HolderId::new("worker-1").unwrap(),
            token,
            0,
            Duration::from_secs(60),
        );
        let committed = store.create_if_absent(lease, 0).await.unwrap();

        assert_eq!(store.save_snapshot(&path, 5).await.unwrap(), 1);
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let loaded = MemoryLeaseStore::new();
        assert_eq!(loaded.load_snapshot(&path).await.unwrap(), 1);
        assert_eq!(loaded.get(&name).await.unwrap(), Some(committed));
        assert_eq!(
            loaded.next_token(&name).await.unwrap(),
            FencingToken::new(2)
        );
    }

    #[tokio::test]
    async fn test_load_missing_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryLeaseStore::new();

        let count = store
            .load_snapshot(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_load_garbage_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leases.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let store = MemoryLeaseStore::new();
        assert!(matches!(
            store.load_snapshot(&path).await,
            Err(SnapshotError::Encoding(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_named_like_its_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leases.tmp");
        let name = LockName::new("orders").unwrap();

        let store = MemoryLeaseStore::new();
        let token = store.next_token(&name).await.unwrap();
        let lease = Lease::new(
            name.clone(),
            HolderId::new("worker-1").unwrap(),
            token,
            0,
            Duration::from_secs(60),
        );
        store.create_if_absent(lease, 0).await.unwrap();

        assert_ne!(temp_path(&path), path);
        assert_eq!(store.save_snapshot(&path, 0).await.unwrap(), 1);
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let loaded = MemoryLeaseStore::new();
        assert_eq!(loaded.load_snapshot(&path).await.unwrap(), 1);
    }

    #[test]
    fn test_snapshot_uses_camel_case() {
        let json = serde_json::to_value(StoreSnapshot::default()).unwrap();
        assert!(json.get("formatVersion").is_some());
        assert!(json.get("globalToken").is_some());
        assert!(json.get("version").is_some());
        assert_eq!(json["fencingScope"], "global");
    }
}
