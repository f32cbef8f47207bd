//! Operation types for expressing replicated changes.
//!
//! Every local change is captured as an [`Operation`]: an immutable,
//! idempotent description of one state change that travels from a device to
//! the server and from the server to the other devices.

use crate::{error::Result, DeviceId, EntityPayload, Error, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for an operation. Doubles as the idempotency key.
pub type OperationId = String;

/// Kind of change an operation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpType {
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(Error::UnknownTag(other.to_string())),
        }
    }
}

/// The entity an operation targets. Selects the shape of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Product,
    Transaction,
    AccountTransaction,
    CashRegister,
    SalesRecord,
    Report,
    InventoryLog,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Transaction => "transaction",
            EntityKind::AccountTransaction => "accountTransaction",
            EntityKind::CashRegister => "cashRegister",
            EntityKind::SalesRecord => "salesRecord",
            EntityKind::Report => "report",
            EntityKind::InventoryLog => "inventoryLog",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "product" => Ok(EntityKind::Product),
            "transaction" => Ok(EntityKind::Transaction),
            "accountTransaction" => Ok(EntityKind::AccountTransaction),
            "cashRegister" => Ok(EntityKind::CashRegister),
            "salesRecord" => Ok(EntityKind::SalesRecord),
            "report" => Ok(EntityKind::Report),
            "inventoryLog" => Ok(EntityKind::InventoryLog),
            other => Err(Error::UnknownTag(other.to_string())),
        }
    }
}

/// Lifecycle of an operation inside the store holding it.
///
/// Client and server each track their own status for the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl OpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpStatus::Pending => "pending",
            OpStatus::Completed => "completed",
            OpStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OpStatus::Pending),
            "completed" => Ok(OpStatus::Completed),
            "failed" => Ok(OpStatus::Failed),
            other => Err(Error::UnknownTag(other.to_string())),
        }
    }
}

/// The unit of replication.
///
/// Serialized exactly as it travels on the wire: the entity kind is sent as
/// `entity` and the payload as a JSON string in `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Globally unique, client generated
    pub id: OperationId,
    /// Milliseconds since epoch at creation
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub op_type: OpType,
    pub entity: EntityKind,
    /// JSON snapshot of the entity state needed to apply the change
    pub data: String,
    pub device_id: DeviceId,
    #[serde(default)]
    pub status: OpStatus,
}

impl Operation {
    /// Create a pending operation with a fresh id.
    pub fn new(
        op_type: OpType,
        entity: EntityKind,
        data: impl Into<String>,
        device_id: impl Into<DeviceId>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: new_operation_id(),
            timestamp,
            op_type,
            entity,
            data: data.into(),
            device_id: device_id.into(),
            status: OpStatus::Pending,
        }
    }

    /// Create a pending operation capturing a typed payload.
    pub fn from_payload(
        payload: &EntityPayload,
        device_id: impl Into<DeviceId>,
        timestamp: Timestamp,
    ) -> Result<Self> {
        Ok(Self::new(
            payload.op_type(),
            payload.kind(),
            payload.encode()?,
            device_id,
            timestamp,
        ))
    }

    /// Replace the id (used for deterministic ids such as snapshot rows).
    pub fn with_id(mut self, id: impl Into<OperationId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_status(mut self, status: OpStatus) -> Self {
        self.status = status;
        self
    }

    /// Decode the payload into its typed form.
    pub fn decode(&self) -> Result<EntityPayload> {
        EntityPayload::decode(self.entity, self.op_type, &self.data)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OpStatus::Pending
    }
}

/// Pull-set ordering: ascending timestamp, ties broken by id.
impl Ord for Operation {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Generate a new random operation id.
pub fn new_operation_id() -> OperationId {
    uuid::Uuid::new_v4().to_string()
}
