//! Wire contract between a device and the sync endpoint.
//!
//! A pass is one request/response exchange: the device pushes every pending
//! operation together with its watermark, and the server answers with the
//! operations other devices produced since then plus a new cursor.

use crate::{DeviceId, EntityId, Operation, OperationId, Timestamp};
use serde::{Deserialize, Serialize};

/// Watermark value that asks for a full product snapshot instead of history.
pub const INITIAL_SYNC_TIMESTAMP: Timestamp = 0;

/// Device id stamped on operations synthesized by the server.
pub const SERVER_DEVICE_ID: &str = "server";

/// Role given to callers that do not declare one.
pub const DEFAULT_ROLE: &str = "user";

/// Id of the synthesized `create` for a product in an initial snapshot.
pub fn initial_operation_id(product_id: &str) -> OperationId {
    format!("initial-{product_id}")
}

/// The cursor handed back to a device. Never behind the request watermark.
pub fn next_cursor(now: Timestamp, watermark: Timestamp) -> Timestamp {
    now.max(watermark)
}

/// Request body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub last_sync_timestamp: Timestamp,
    pub device_id: DeviceId,
}

impl SyncRequest {
    pub fn new(device_id: impl Into<DeviceId>, last_sync_timestamp: Timestamp) -> Self {
        Self {
            operations: Vec::new(),
            last_sync_timestamp,
            device_id: device_id.into(),
        }
    }

    pub fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = operations;
        self
    }

    pub fn is_initial(&self) -> bool {
        self.last_sync_timestamp == INITIAL_SYNC_TIMESTAMP
    }
}

/// Response body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub last_sync_timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResponse {
    pub fn ok(operations: Vec<Operation>, last_sync_timestamp: Timestamp) -> Self {
        Self {
            success: true,
            operations,
            last_sync_timestamp,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            operations: Vec::new(),
            last_sync_timestamp: 0,
            error: Some(error.into()),
        }
    }
}

/// The authenticated caller, used for audit fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: EntityId,
    pub role: String,
}

impl Identity {
    pub fn new(id: impl Into<EntityId>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    pub fn user(id: impl Into<EntityId>) -> Self {
        Self::new(id, DEFAULT_ROLE)
    }
}
