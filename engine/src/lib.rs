//! # Tally Engine
//!
//! The offline core of a point-of-sale terminal.
//!
//! This crate holds the logic shared by devices and the sync server: the
//! operation model, typed entity payloads, the wire protocol, the device's
//! operation queue and local replica, and the domain mutators that keep the
//! two in step.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine knows nothing about files, sockets or clocks;
//!   callers pass the current time in.
//! - **One change, one operation**: every local write enqueues exactly one
//!   [`Operation`] describing the same change it applied to the replica.
//! - **Idempotent by id**: an operation id is its dedup key everywhere.
//!
//! ## Core Concepts
//!
//! ### Operations
//!
//! An [`Operation`] carries `type` ([`OpType`]), `entity` ([`EntityKind`]) and a
//! JSON `data` snapshot. [`EntityPayload`] is the decoded, typed form.
//!
//! ### Local state
//!
//! [`LocalStore`] combines the [`OperationQueue`] with the [`LocalCache`]
//! replica. Pulled operations are applied with [`LocalStore::apply_remote`],
//! which never enqueues.
//!
//! ### Protocol
//!
//! [`SyncRequest`] and [`SyncResponse`] are the bodies of `POST /sync`.
//!
//! ## Quick Start
//!
//! ```rust
//! use tally_engine::{LocalStore, NewProduct, NewSale, SaleItem, PaymentMethod};
//!
//! let mut store = LocalStore::new("device-1");
//! let product = store
//!     .create_product(
//!         NewProduct { name: "Coffee".into(), price: 2.5, stock: 10, ..Default::default() },
//!         1706745600000,
//!     )
//!     .unwrap();
//!
//! store
//!     .record_sale(
//!         NewSale {
//!             items: vec![SaleItem::new(product.id.as_str(), 2)],
//!             payment: PaymentMethod::Cash,
//!             discount: 0.0,
//!             customer_name: None,
//!             user_id: "cashier-1".into(),
//!         },
//!         1706745601000,
//!     )
//!     .unwrap();
//!
//! assert_eq!(store.pending_count(), 2);
//! assert_eq!(store.cache().products.get(&product.id).unwrap().stock, 8);
//! ```
//!
//! ## Persistence
//!
//! [`ClientSnapshot`] captures a store and its watermark as deterministic JSON.

pub mod cache;
pub mod entity;
pub mod error;
pub mod operation;
pub mod payload;
pub mod protocol;
pub mod queue;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cache::{Collection, LocalCache};
pub use entity::{
    Account, AccountClose, AccountDirective, AccountStatus, AccountTransaction, AccountTxKind,
    AccountType, CashRegister, InventoryLog, PaymentMethod, PrepaidProduct, Product, ProductRef,
    RegisterStatus, Report, SaleLine, SaleSource, SalesRecord, Transaction, TransactionItem,
    TransactionStatus,
};
pub use error::Error;
pub use operation::{new_operation_id, EntityKind, OpStatus, OpType, Operation, OperationId};
pub use payload::EntityPayload;
pub use protocol::{
    initial_operation_id, next_cursor, Identity, SyncRequest, SyncResponse,
    DEFAULT_ROLE, INITIAL_SYNC_TIMESTAMP, SERVER_DEVICE_ID,
};
pub use queue::OperationQueue;
pub use snapshot::{ClientSnapshot, SnapshotMetadata, SNAPSHOT_FORMAT_VERSION};
pub use store::{
    datetime_from_millis, AccountEntry, ApplyOutcome, LocalStore, NewProduct, NewSale, SaleItem,
};

/// Type aliases for clarity
pub type EntityId = String;
pub type DeviceId = String;
/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;
