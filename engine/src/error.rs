//! Error types for the Tally engine.

use crate::{EntityId, EntityKind, OpType, OperationId};
use thiserror::Error;

/// All possible errors from the Tally engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Local state errors
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: EntityId },

    #[error("account is closed: {0}")]
    AccountClosed(EntityId),

    #[error("insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: EntityId,
        available: i64,
        requested: i64,
    },

    #[error("insufficient prepaid balance for product {product_id}: remaining {remaining}, requested {requested}")]
    InsufficientPrepaid {
        product_id: EntityId,
        remaining: i64,
        requested: i64,
    },

    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: EntityId, quantity: i64 },

    #[error("transaction has no items")]
    EmptyTransaction,

    #[error("a cash register is already open: {0}")]
    RegisterAlreadyOpen(EntityId),

    #[error("no open cash register")]
    NoOpenRegister,

    // Operation errors
    #[error("invalid {kind} {op_type} payload: {message}")]
    InvalidPayload {
        kind: EntityKind,
        op_type: OpType,
        message: String,
    },

    #[error("unsupported operation: {op_type} on {kind}")]
    UnsupportedOperation { kind: EntityKind, op_type: OpType },

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("duplicate operation id: {0}")]
    DuplicateOperation(OperationId),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl Error {
    pub fn not_found(kind: &'static str, id: impl Into<EntityId>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
