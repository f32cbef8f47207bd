//! In-memory store backend.
//!
//! Every session holds the table lock for its whole lifetime, so sessions
//! are serialized. A transactional session works on a staged copy of the
//! tables and swaps it in on commit.

use super::{Database, EntityStore, Ledger, Session, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tally_engine::{
    Account, AccountTransaction, AccountTxKind, CashRegister, Collection, EntityId, InventoryLog,
    OpStatus, Operation, PrepaidProduct, Product, SaleSource, SalesRecord, Timestamp, Transaction,
    TransactionStatus,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    operations: BTreeMap<String, Operation>,
    products: Collection<Product>,
    transactions: Collection<Transaction>,
    accounts: Collection<Account>,
    account_transactions: Collection<AccountTransaction>,
    prepaid: BTreeMap<(EntityId, EntityId), PrepaidProduct>,
    cash_registers: Collection<CashRegister>,
    sales: BTreeMap<(EntityId, SaleSource), SalesRecord>,
    inventory_logs: Collection<InventoryLog>,
}

/// Shared in-memory database. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    async fn open(&self, transactional: bool) -> MemorySession {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = transactional.then(|| (*guard).clone());
        MemorySession { guard, staged }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(self.open(false).await))
    }

    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(self.open(true).await))
    }
}

/// Session over a [`MemoryDatabase`].
pub struct MemorySession {
    guard: OwnedMutexGuard<Tables>,
    staged: Option<Tables>,
}

impl MemorySession {
    fn tables(&mut self) -> &mut Tables {
        match &mut self.staged {
            Some(staged) => staged,
            None => &mut *self.guard,
        }
    }
}

#[async_trait]
impl Ledger for MemorySession {
    async fn insert_operation(&mut self, op: &Operation) -> StoreResult<bool> {
        let operations = &mut self.tables().operations;
        if operations.contains_key(&op.id) {
            return Ok(false);
        }
        operations.insert(op.id.clone(), op.clone().with_status(OpStatus::Pending));
        Ok(true)
    }

    async fn set_operation_status(&mut self, id: &str, status: OpStatus) -> StoreResult<()> {
        if let Some(op) = self.tables().operations.get_mut(id) {
            op.status = status;
        }
        Ok(())
    }

    async fn find_operation(&mut self, id: &str) -> StoreResult<Option<Operation>> {
        Ok(self.tables().operations.get(id).cloned())
    }

    async fn completed_since(
        &mut self,
        since: Timestamp,
        exclude_device: &str,
    ) -> StoreResult<Vec<Operation>> {
        let mut ops: Vec<Operation> = self
            .tables()
            .operations
            .values()
            .filter(|op| {
                op.timestamp > since
                    && op.device_id != exclude_device
                    && op.status == OpStatus::Completed
            })
            .cloned()
            .collect();
        ops.sort();
        Ok(ops)
    }
}

#[async_trait]
impl EntityStore for MemorySession {
    async fn find_product(&mut self, id: &str) -> StoreResult<Option<Product>> {
        Ok(self.tables().products.get(id).cloned())
    }

    async fn find_colliding_product(
        &mut self,
        name: &str,
        barcode: Option<&str>,
    ) -> StoreResult<Option<Product>> {
        Ok(self
            .tables()
            .products
            .iter()
            .find(|p| p.collides_with(name, barcode))
            .cloned())
    }

    async fn list_products(&mut self) -> StoreResult<Vec<Product>> {
        Ok(self.tables().products.iter().cloned().collect())
    }

    async fn lock_product_keys(&mut self, _keys: &[String]) -> StoreResult<()> {
        // The session already holds the table lock.
        Ok(())
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        self.tables().products.insert(product.clone());
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        let products = &mut self.tables().products;
        if !products.contains(&product.id) {
            return Ok(false);
        }
        products.insert(product.clone());
        Ok(true)
    }

    async fn delete_product(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.tables().products.remove(id).is_some())
    }

    async fn adjust_stock(&mut self, product_id: &str, delta: i64) -> StoreResult<()> {
        match self.tables().products.get_mut(product_id) {
            Some(product) => {
                product.stock += delta;
                Ok(())
            }
            None => Err(StoreError::not_found("product", product_id)),
        }
    }

    async fn transaction_exists(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.tables().transactions.contains(id))
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        self.tables().transactions.insert(transaction.clone());
        Ok(())
    }

    async fn find_account(&mut self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.tables().accounts.get(id).cloned())
    }

    async fn upsert_account(&mut self, account: &Account) -> StoreResult<()> {
        self.tables().accounts.insert(account.clone());
        Ok(())
    }

    async fn close_account(
        &mut self,
        id: &str,
        closed_at: DateTime<Utc>,
        closed_by: &str,
    ) -> StoreResult<bool> {
        match self.tables().accounts.get_mut(id) {
            Some(account) => {
                account.close(closed_at, closed_by);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_account_transaction(
        &mut self,
        id: &str,
    ) -> StoreResult<Option<AccountTransaction>> {
        Ok(self.tables().account_transactions.get(id).cloned())
    }

    async fn insert_account_transaction(&mut self, tx: &AccountTransaction) -> StoreResult<()> {
        self.tables().account_transactions.insert(tx.clone());
        Ok(())
    }

    async fn account_transactions(
        &mut self,
        account_id: &str,
    ) -> StoreResult<Vec<AccountTransaction>> {
        Ok(self
            .tables()
            .account_transactions
            .iter()
            .filter(|tx| tx.account_id.as_deref() == Some(account_id))
            .cloned()
            .collect())
    }

    async fn close_account_transactions(&mut self, account_id: &str) -> StoreResult<u64> {
        let mut closed = 0;
        for tx in self.tables().account_transactions.iter_mut() {
            if tx.account_id.as_deref() == Some(account_id) {
                tx.status = TransactionStatus::Closed;
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn find_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
    ) -> StoreResult<Option<PrepaidProduct>> {
        let key = (account_id.to_string(), product_id.to_string());
        Ok(self.tables().prepaid.get(&key).cloned())
    }

    async fn record_prepaid(
        &mut self,
        account_id: &str,
        product_id: &str,
        kind: AccountTxKind,
        quantity: i64,
    ) -> StoreResult<bool> {
        let key = (account_id.to_string(), product_id.to_string());
        let prepaid = &mut self.tables().prepaid;
        match prepaid.get_mut(&key) {
            Some(counter) => counter.record(kind, quantity),
            None if kind == AccountTxKind::Credit => {
                let counter = PrepaidProduct {
                    account_id: key.0.clone(),
                    product_id: key.1.clone(),
                    paid: quantity,
                    consumed: 0,
                };
                prepaid.insert(key, counter);
            }
            None => return Ok(false),
        }
        Ok(true)
    }

    async fn find_cash_register(&mut self, id: &str) -> StoreResult<Option<CashRegister>> {
        Ok(self.tables().cash_registers.get(id).cloned())
    }

    async fn upsert_cash_register(&mut self, register: &CashRegister) -> StoreResult<()> {
        self.tables().cash_registers.insert(register.clone());
        Ok(())
    }

    async fn record_sale(&mut self, record: &SalesRecord) -> StoreResult<bool> {
        let key = (record.source_id.clone(), record.source);
        let sales = &mut self.tables().sales;
        if sales.contains_key(&key) {
            return Ok(false);
        }
        sales.insert(key, record.clone());
        Ok(true)
    }

    async fn find_sale(
        &mut self,
        source_id: &str,
        source: SaleSource,
    ) -> StoreResult<Option<SalesRecord>> {
        let key = (source_id.to_string(), source);
        Ok(self.tables().sales.get(&key).cloned())
    }

    async fn find_inventory_log(&mut self, id: &str) -> StoreResult<Option<InventoryLog>> {
        Ok(self.tables().inventory_logs.get(id).cloned())
    }

    async fn insert_inventory_log(&mut self, log: &InventoryLog) -> StoreResult<()> {
        self.tables().inventory_logs.insert(log.clone());
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut this = *self;
        if let Some(staged) = this.staged.take() {
            *this.guard = staged;
        }
        Ok(())
    }
}
