//! Persistence of client state between restarts.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tally_engine::ClientSnapshot;

/// Where a device keeps its [`ClientSnapshot`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the last saved snapshot, if any.
    async fn load(&self) -> SyncResult<Option<ClientSnapshot>>;

    /// Replace the saved snapshot.
    async fn save(&self, snapshot: &ClientSnapshot) -> SyncResult<()>;
}

/// JSON file on disk, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
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
impl StateStore for FileStateStore {
    async fn load(&self) -> SyncResult<Option<ClientSnapshot>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        ClientSnapshot::from_json(&json)
            .map(Some)
            .map_err(|e| SyncError::Persistence(e.to_string()))
    }

    async fn save(&self, snapshot: &ClientSnapshot) -> SyncResult<()> {
        let json = snapshot.to_json()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

/// In-memory state, for tests and ephemeral devices.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    snapshot: Mutex<Option<ClientSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot.
    pub fn with_snapshot(snapshot: ClientSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// The last saved snapshot.
    pub fn saved(&self) -> Option<ClientSnapshot> {
        self.snapshot.lock().clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> SyncResult<Option<ClientSnapshot>> {
        Ok(self.snapshot.lock().clone())
    }

    async fn save(&self, snapshot: &ClientSnapshot) -> SyncResult<()> {
        *self.snapshot.lock() = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nested").join("state.json"));

        assert!(store.load().await.unwrap().is_none());

        let mut snapshot = ClientSnapshot::new("dev-1");
        snapshot.last_sync_timestamp = 1234;
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = FileStateStore::new(&path).load().await;
        assert!(matches!(result, Err(SyncError::Persistence(_))));
    }

    #[tokio::test]
    async fn memory_store_keeps_last_save() {
        let store = MemoryStateStore::new();
        store.save(&ClientSnapshot::new("a")).await.unwrap();
        store.save(&ClientSnapshot::new("b")).await.unwrap();
        assert_eq!(store.saved().unwrap().device_id, "b");
    }
}
