//! Snapshot types for persisting and restoring client state.
//!
//! A snapshot bundles everything a device must keep across restarts: its
//! identity, its watermark, the local replica and the operation queue.
//! Collections are ordered maps so the serialized form is deterministic.

use crate::{
    error::Result, DeviceId, Error, LocalCache, LocalStore, OpStatus, OperationQueue, Timestamp,
    INITIAL_SYNC_TIMESTAMP,
};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time snapshot of one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    pub device_id: DeviceId,
    /// Watermark returned by the last successful pass
    pub last_sync_timestamp: Timestamp,
    #[serde(default)]
    pub cache: LocalCache,
    #[serde(default)]
    pub queue: OperationQueue,
}

impl ClientSnapshot {
    /// A fresh device: empty replica, empty queue, watermark at zero.
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            device_id: device_id.into(),
            last_sync_timestamp: INITIAL_SYNC_TIMESTAMP,
            cache: LocalCache::new(),
            queue: OperationQueue::new(),
        }
    }

    /// Capture a store and its watermark.
    pub fn capture(store: &LocalStore, last_sync_timestamp: Timestamp) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            device_id: store.device_id().clone(),
            last_sync_timestamp,
            cache: store.cache().clone(),
            queue: store.queue().clone(),
        }
    }

    /// Rebuild the store this snapshot was taken from.
    pub fn into_store(self) -> (LocalStore, Timestamp) {
        let watermark = self.last_sync_timestamp;
        (
            LocalStore::from_parts(self.device_id, self.cache, self.queue),
            watermark,
        )
    }

    pub fn metadata(&self) -> SnapshotMetadata {
        SnapshotMetadata::from(self)
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if snapshot.device_id.is_empty() {
            return Err(Error::InvalidSnapshot("empty device id".to_string()));
        }
        if snapshot.last_sync_timestamp < 0 {
            return Err(Error::InvalidSnapshot(format!(
                "negative watermark: {}",
                snapshot.last_sync_timestamp
            )));
        }

        Ok(snapshot)
    }
}

/// Metadata about a snapshot (without the full data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub format_version: u32,
    pub device_id: DeviceId,
    pub last_sync_timestamp: Timestamp,
    pub product_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
}

impl From<&ClientSnapshot> for SnapshotMetadata {
    fn from(snapshot: &ClientSnapshot) -> Self {
        Self {
            format_version: snapshot.format_version,
            device_id: snapshot.device_id.clone(),
            last_sync_timestamp: snapshot.last_sync_timestamp,
            product_count: snapshot.cache.products.len(),
            pending_count: snapshot.queue.count_by_status(OpStatus::Pending),
            failed_count: snapshot.queue.count_by_status(OpStatus::Failed),
        }
    }
}
