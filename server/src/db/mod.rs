//! Authoritative store for the reconciliation service.
//!
//! The service only needs two things from the relational store: an
//! append-only operation ledger and per-entity primitives, both reachable
//! through a [`Session`]. A session is either autocommit (every call is
//! durable on return) or transactional (nothing is visible until
//! [`Session::commit`]; dropping it rolls back).
//!
//! Two backends implement [`Database`]: PostgreSQL through sqlx and an
//! in-memory store used by tests and `STORE=memory`.

mod memory;
mod operations;
mod pool;
mod records;

pub use memory::{MemoryDatabase, MemorySession};
pub use pool::{create_pool, run_migrations, PgDatabase, PgSession, Pool};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_engine::{
    Account, AccountTransaction, AccountTxKind, CashRegister, EntityId, InventoryLog, OpStatus,
    Operation, PrepaidProduct, Product, SaleSource, SalesRecord, Timestamp, Transaction,
};

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: EntityId },

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("store misconfigured: {0}")]
    Misconfigured(&'static str),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<EntityId>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Global operation ledger. Append-only; only the status column changes.
#[async_trait]
pub trait Ledger: Send {
    /// Insert with status `pending` unless the id is already present.
    ///
    /// Returns `false` when the id exists, including when a concurrent
    /// request inserted it first.
    async fn insert_operation(&mut self, op: &Operation) -> StoreResult<bool>;

    async fn set_operation_status(&mut self, id: &str, status: OpStatus) -> StoreResult<()>;

    async fn find_operation(&mut self, id: &str) -> StoreResult<Option<Operation>>;

    /// Completed operations newer than `since` from every device except
    /// `exclude_device`, ascending by timestamp.
    async fn completed_since(
        &mut self,
        since: Timestamp,
        exclude_device: &str,
    ) -> StoreResult<Vec<Operation>>;
}

/// Per-entity primitives over the authoritative tables.
#[async_trait]
pub trait EntityStore: Send {
    // Products
    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>>;

    /// First product with the same name or the same non-empty barcode.
    async fn find_colliding_product(
        &mut self,
        name: &str,
        barcode: Option<&str>,
    ) -> StoreResult<Option<Product>>;

    async fn list_products(&mut self) -> StoreResult<Vec<Product>>;

    /// Hold exclusive product-creation locks on `keys` until the session
    /// ends. Only a transactional session keeps them past the call.
    async fn lock_product_keys(&mut self, keys: &[String]) -> StoreResult<()>;

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    /// Replace by primary key. Returns `false` if missing.
    async fn update_product(&mut self, product: &Product) -> StoreResult<bool>;

    /// Returns `false` if missing.
    async fn delete_product(&mut self, id: &str) -> StoreResult<bool>;

    /// Add `delta` to the stock count. Missing product is an error.
    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<()>;

    // POS transactions
    async fn transaction_exists(&mut self, id: &str) -> StoreResult<bool>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    // Accounts
    async fn find_account(&mut self, id: &str) -> StoreResult<Option<Account>>;

    async fn upsert_account(&mut self, account: &Account) -> StoreResult<()>;

    /// Mark closed. Returns `false` if the account is unknown.
    async fn close_account(
        &mut self,
        id: &str,
        closed_at: DateTime<Utc>,
        closed_by: &str,
    ) -> StoreResult<bool>;

    async fn find_account_transaction(
        &mut self,
        id: &str,
    ) -> StoreResult<Option<AccountTransaction>>;

    async fn insert_account_transaction(&mut self, tx: &AccountTransaction) -> StoreResult<()>;

    async fn account_transactions(
        &mut self,
        account_id: &str,
    ) -> StoreResult<Vec<AccountTransaction>>;

    /// Mark every transaction of the account closed. Returns how many.
    async fn close_account_transactions(&mut self, account_id: &str) -> StoreResult<u64>;

    async fn find_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
    ) -> StoreResult<Option<PrepaidProduct>>;

    /// Add `quantity` to the paid (credit) or consumed (debit) counter in
    /// one statement. A credit creates the row when missing; a debit without
    /// a row changes nothing. Returns whether a row was written.
    async fn record_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
        kind: AccountTxKind,
        quantity: i64,
    ) -> StoreResult<bool>;

    // Cash registers
    async fn find_cash_register(&mut self, id: &str) -> StoreResult<Option<CashRegister>>;

    async fn upsert_cash_register(&mut self, register: &CashRegister) -> StoreResult<()>;

    // Sales
    /// Insert unless `(source_id, source)` exists. Returns whether inserted.
    async fn record_sale(&mut self, record: &SalesRecord) -> StoreResult<bool>;

    async fn find_sale(
        &mut self,
        source_id: &str,
        source: SaleSource,
    ) -> StoreResult<Option<SalesRecord>>;

    // Inventory
    async fn find_inventory_log(&mut self, id: &str) -> StoreResult<Option<InventoryLog>>;

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> StoreResult<()>;
}

/// A unit of work against the store.
#[async_trait]
pub trait Session: Ledger + EntityStore {
    /// Make a transactional session durable. A no-op for autocommit ones.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Entry point to a store backend.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    /// Autocommit session.
    async fn session(&self) -> StoreResult<Box<dyn Session>>;

    /// All-or-nothing session. Dropped without commit means rolled back.
    async fn begin(&self) -> StoreResult<Box<dyn Session>>;
}
