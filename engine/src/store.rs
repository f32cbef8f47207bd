//! LocalStore - the device-side state container.
//!
//! The LocalStore holds the local replica of entities and the operation
//! queue. Every mutator validates against the cache, enqueues exactly one
//! operation describing the change, then applies it to the cache. A mutator
//! that fails validation leaves both untouched.

use crate::cache::LocalCache;
use crate::entity::{
    Account, AccountClose, AccountDirective, AccountTransaction, AccountTxKind, AccountType,
    CashRegister, InventoryLog, PaymentMethod, Product, ProductRef, RegisterStatus, Transaction,
    TransactionItem, TransactionStatus,
};
use crate::{
    error::Result, DeviceId, EntityId, EntityKind, EntityPayload, Error, Operation,
    OperationId, OperationQueue, Timestamp,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Convert a millisecond timestamp into a UTC date.
pub fn datetime_from_millis(ts: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// Fields of a product about to be created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[serde(default)]
    pub supplier_id: Option<EntityId>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A product and quantity picked at the counter. Price comes from the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub product_id: EntityId,
    pub quantity: i64,
}

impl SaleItem {
    pub fn new(product_id: impl Into<EntityId>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A POS sale about to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSale {
    pub items: Vec<SaleItem>,
    #[serde(default)]
    pub payment: PaymentMethod,
    #[serde(default)]
    pub discount: f64,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub user_id: String,
}

/// A movement about to be posted on a customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountEntry {
    pub kind: AccountTxKind,
    #[serde(default)]
    pub items: Vec<SaleItem>,
    /// Explicit amount for entries without items (plain payments).
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub discount: Option<f64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub user_id: String,
}

/// What happened to a pulled operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already present, missing target, or not cached on devices.
    Skipped,
}

/// The device's replica plus its pending operations.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalStore {
    device_id: DeviceId,
    cache: LocalCache,
    queue: OperationQueue,
}

impl LocalStore {
    /// Create an empty store for a device.
    pub fn new(device_id: impl Into<DeviceId>) -> Self {
        Self::from_parts(device_id, LocalCache::new(), OperationQueue::new())
    }

    /// Rebuild a store from persisted parts.
    pub fn from_parts(device_id: impl Into<DeviceId>, cache: LocalCache, queue: OperationQueue) -> Self {
        Self {
            device_id: device_id.into(),
            cache,
            queue,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut OperationQueue {
        &mut self.queue
    }

    pub fn pending_operations(&self) -> Vec<Operation> {
        self.queue.pending_operations()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.pending_count()
    }

    /// Seed an account fetched from outside the sync path.
    ///
    /// Accounts are opened through the back office, so this does not enqueue.
    pub fn upsert_account(&mut self, account: Account) {
        self.cache.accounts.insert(account);
    }

    /// Seed a product without enqueueing.
    pub fn upsert_product(&mut self, product: Product) {
        self.cache.products.insert(product);
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub fn create_product(&mut self, new: NewProduct, now: Timestamp) -> Result<Product> {
        let product = Product {
            id: new_entity_id(),
            name: new.name,
            price: new.price,
            cost: new.cost,
            stock: new.stock,
            category: new.category,
            barcode: new.barcode,
            min_stock: new.min_stock,
            supplier_id: new.supplier_id,
            image_url: new.image_url,
            is_active: true,
        };

        self.record(EntityPayload::ProductCreate(product.clone()), now)?;
        self.cache.products.insert(product.clone());
        Ok(product)
    }

    /// Replace a cached product with a new snapshot.
    pub fn update_product(&mut self, product: Product, now: Timestamp) -> Result<()> {
        if !self.cache.products.contains(&product.id) {
            return Err(Error::not_found("product", product.id));
        }

        self.record(EntityPayload::ProductUpdate(product.clone()), now)?;
        self.cache.products.insert(product);
        Ok(())
    }

    pub fn delete_product(&mut self, product_id: &str, now: Timestamp) -> Result<()> {
        if !self.cache.products.contains(product_id) {
            return Err(Error::not_found("product", product_id));
        }

        let reference = ProductRef {
            id: product_id.to_string(),
        };
        self.record(EntityPayload::ProductDelete(reference), now)?;
        self.cache.products.remove(product_id);
        Ok(())
    }

    /// Move stock by `delta` and replicate the full new product snapshot.
    pub fn adjust_stock(&mut self, product_id: &str, delta: i64, now: Timestamp) -> Result<Product> {
        let mut product = self
            .cache
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| Error::not_found("product", product_id))?;

        if product.stock + delta < 0 {
            return Err(Error::InsufficientStock {
                product_id: product.id,
                available: product.stock,
                requested: -delta,
            });
        }
        product.stock += delta;

        self.record(EntityPayload::ProductUpdate(product.clone()), now)?;
        self.cache.products.insert(product.clone());
        Ok(product)
    }

    // ------------------------------------------------------------------
    // POS
    // ------------------------------------------------------------------

    /// Sell items at the counter.
    pub fn record_sale(&mut self, sale: NewSale, now: Timestamp) -> Result<Transaction> {
        let items = self.price_items(&sale.items, true)?;
        let subtotal: f64 = items.iter().map(TransactionItem::line_total).sum();

        let transaction = Transaction {
            id: new_entity_id(),
            amount: subtotal - sale.discount,
            discount: sale.discount,
            payment: sale.payment,
            created_at: datetime_from_millis(now),
            customer_name: sale.customer_name,
            user_id: sale.user_id,
            device_id: self.device_id.clone(),
            status: TransactionStatus::Active,
            items,
        };

        self.record(EntityPayload::TransactionCreate(transaction.clone()), now)?;
        for item in &transaction.items {
            self.cache.adjust_stock(&item.product_id, -item.quantity);
        }
        self.cache.transactions.insert(transaction.clone());
        Ok(transaction)
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    /// Post a movement on an open account.
    pub fn add_account_items(
        &mut self,
        account_id: &str,
        entry: AccountEntry,
        now: Timestamp,
    ) -> Result<AccountTransaction> {
        let account_type = self.open_account(account_id)?.account_type;

        let moves_stock = matches!(
            (account_type, entry.kind),
            (AccountType::Prepaid, AccountTxKind::Credit)
                | (AccountType::Accumulated, AccountTxKind::Debit)
        );
        if entry.items.is_empty() && entry.amount.is_none() {
            return Err(Error::EmptyTransaction);
        }
        let items = self.price_items(&entry.items, moves_stock)?;

        if account_type == AccountType::Prepaid && entry.kind == AccountTxKind::Debit {
            for item in &items {
                let remaining = self
                    .cache
                    .prepaid(account_id, &item.product_id)
                    .map(|p| p.remaining())
                    .unwrap_or(0);
                if remaining < item.quantity {
                    return Err(Error::InsufficientPrepaid {
                        product_id: item.product_id.clone(),
                        remaining,
                        requested: item.quantity,
                    });
                }
            }
        }

        let discount = entry.discount.unwrap_or(0.0);
        let amount = match entry.amount {
            Some(amount) => amount,
            None => items.iter().map(TransactionItem::line_total).sum::<f64>() - discount,
        };

        let transaction = AccountTransaction {
            id: new_entity_id(),
            account_id: Some(account_id.to_string()),
            account_type,
            kind: entry.kind,
            amount,
            user_id: entry.user_id,
            created_at: datetime_from_millis(now),
            items,
            status: TransactionStatus::Active,
            method: entry.method,
            note: entry.note,
            discount: entry.discount,
        };

        self.record(
            EntityPayload::AccountTransactionCreate(transaction.clone()),
            now,
        )?;
        self.cache.fold_account_transaction(&transaction);
        self.cache.account_transactions.insert(transaction.clone());
        Ok(transaction)
    }

    /// Close an account and every transaction on it.
    pub fn close_account(&mut self, account_id: &str, user_id: &str, now: Timestamp) -> Result<()> {
        self.open_account(account_id)?;

        let at = datetime_from_millis(now);
        let directive = AccountDirective::Close(AccountClose {
            account_id: account_id.to_string(),
            timestamp: at,
            user_id: user_id.to_string(),
        });

        self.record(EntityPayload::AccountDirective(directive), now)?;
        if let Some(account) = self.cache.accounts.get_mut(account_id) {
            account.close(at, user_id);
        }
        self.cache.close_account_transactions(account_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cash register
    // ------------------------------------------------------------------

    pub fn open_register(
        &mut self,
        initial_amount: f64,
        user_id: &str,
        now: Timestamp,
    ) -> Result<CashRegister> {
        if let Some(open) = self.cache.open_register() {
            return Err(Error::RegisterAlreadyOpen(open.id.clone()));
        }

        let register = CashRegister {
            id: new_entity_id(),
            status: RegisterStatus::Open,
            initial_amount,
            final_amount: None,
            opened_at: datetime_from_millis(now),
            closed_at: None,
            device_id: self.device_id.clone(),
            user_id: user_id.to_string(),
        };

        self.record(EntityPayload::CashRegisterCreate(register.clone()), now)?;
        self.cache.cash_registers.insert(register.clone());
        Ok(register)
    }

    pub fn close_register(&mut self, final_amount: f64, now: Timestamp) -> Result<CashRegister> {
        let mut register = self
            .cache
            .open_register()
            .cloned()
            .ok_or(Error::NoOpenRegister)?;

        register.status = RegisterStatus::Closed;
        register.final_amount = Some(final_amount);
        register.closed_at = Some(datetime_from_millis(now));

        self.record(EntityPayload::CashRegisterUpdate(register.clone()), now)?;
        self.cache.cash_registers.insert(register.clone());
        Ok(register)
    }

    // ------------------------------------------------------------------
    // Inventory
    // ------------------------------------------------------------------

    pub fn log_inventory(
        &mut self,
        product_id: &str,
        action: &str,
        description: Option<String>,
        user_id: &str,
        now: Timestamp,
    ) -> Result<InventoryLog> {
        let product = self
            .cache
            .products
            .get(product_id)
            .ok_or_else(|| Error::not_found("product", product_id))?;

        let log = InventoryLog {
            id: new_entity_id(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            description,
            timestamp: datetime_from_millis(now),
        };

        self.record(EntityPayload::InventoryLogCreate(log.clone()), now)?;
        self.cache.inventory_logs.insert(log.clone());
        Ok(log)
    }

    // ------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------

    /// Apply an operation pulled from the server. Never enqueues.
    pub fn apply_remote(&mut self, op: &Operation) -> Result<ApplyOutcome> {
        use ApplyOutcome::{Applied, Skipped};

        let outcome = match op.decode()? {
            EntityPayload::ProductCreate(product) => {
                let exists = self.cache.products.contains(&product.id)
                    || self
                        .cache
                        .find_colliding_product(&product.name, product.barcode.as_deref())
                        .is_some();
                if exists {
                    Skipped
                } else {
                    self.cache.products.insert(product);
                    Applied
                }
            }
            EntityPayload::ProductUpdate(product) => {
                if self.cache.products.contains(&product.id) {
                    self.cache.products.insert(product);
                    Applied
                } else {
                    Skipped
                }
            }
            EntityPayload::ProductDelete(reference) => match self.cache.products.remove(&reference.id) {
                Some(_) => Applied,
                None => Skipped,
            },
            EntityPayload::TransactionCreate(transaction) => {
                if self.cache.transactions.contains(&transaction.id) {
                    Skipped
                } else {
                    for item in &transaction.items {
                        self.cache.adjust_stock(&item.product_id, -item.quantity);
                    }
                    self.cache.transactions.insert(transaction);
                    Applied
                }
            }
            EntityPayload::AccountTransactionCreate(transaction) => {
                if transaction.account_id.is_none()
                    || self.cache.account_transactions.contains(&transaction.id)
                {
                    Skipped
                } else {
                    self.cache.fold_account_transaction(&transaction);
                    self.cache.account_transactions.insert(transaction);
                    Applied
                }
            }
            EntityPayload::AccountDirective(AccountDirective::Close(close)) => {
                let known = match self.cache.accounts.get_mut(&close.account_id) {
                    Some(account) => {
                        account.close(close.timestamp, close.user_id.as_str());
                        true
                    }
                    None => false,
                };
                let closed = self.cache.close_account_transactions(&close.account_id);
                if known || closed > 0 {
                    Applied
                } else {
                    Skipped
                }
            }
            EntityPayload::CashRegisterCreate(register)
            | EntityPayload::CashRegisterUpdate(register) => {
                self.cache.cash_registers.insert(register);
                Applied
            }
            EntityPayload::InventoryLogCreate(log) => {
                if self.cache.inventory_logs.contains(&log.id) {
                    Skipped
                } else {
                    self.cache.inventory_logs.insert(log);
                    Applied
                }
            }
            EntityPayload::SalesRecordCreate(_) | EntityPayload::ReportCreate(_) => Skipped,
        };

        Ok(outcome)
    }

    /// Drop cached entities of one kind ahead of a full pull.
    pub fn clear_kind(&mut self, kind: EntityKind) {
        self.cache.clear(kind);
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn record(&mut self, payload: EntityPayload, now: Timestamp) -> Result<OperationId> {
        let op = Operation::from_payload(&payload, self.device_id.clone(), now)?;
        Ok(self.queue.enqueue(op)?.id.clone())
    }

    fn open_account(&self, account_id: &str) -> Result<&Account> {
        let account = self
            .cache
            .accounts
            .get(account_id)
            .ok_or_else(|| Error::not_found("account", account_id))?;
        if !account.is_open() {
            return Err(Error::AccountClosed(account_id.to_string()));
        }
        Ok(account)
    }

    /// Resolve prices from the cache, optionally checking stock.
    fn price_items(&self, items: &[SaleItem], check_stock: bool) -> Result<Vec<TransactionItem>> {
        let mut requested: BTreeMap<&str, i64> = BTreeMap::new();
        let mut priced = Vec::with_capacity(items.len());

        for item in items {
            if item.quantity <= 0 {
                return Err(Error::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
            let product = self
                .cache
                .products
                .get(&item.product_id)
                .ok_or_else(|| Error::not_found("product", item.product_id.as_str()))?;

            *requested.entry(item.product_id.as_str()).or_default() += item.quantity;
            priced.push(TransactionItem::new(
                item.product_id.as_str(),
                item.quantity,
                product.price,
            ));
        }

        if check_stock {
            if priced.is_empty() {
                return Err(Error::EmptyTransaction);
            }
            for (product_id, quantity) in requested {
                let available = self.cache.products.get(product_id).map_or(0, |p| p.stock);
                if available < quantity {
                    return Err(Error::InsufficientStock {
                        product_id: product_id.to_string(),
                        available,
                        requested: quantity,
                    });
                }
            }
        }

        Ok(priced)
    }
}
