//! Local replica of server entities.
//!
//! The cache is what the terminal reads from while offline. It is a
//! read-ahead projection, never authoritative: the server may later skip or
//! reject a change that was already applied here.

use crate::entity::{
    Account, AccountTransaction, CashRegister, InventoryLog, PrepaidProduct, Product, RegisterStatus,
    Transaction, TransactionStatus,
};
use crate::{EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entities that can be stored in a [`Collection`].
pub trait Keyed {
    fn key(&self) -> &EntityId;
}

macro_rules! keyed_by_id {
    ($($ty:ty),* $(,)?) => {
        $(impl Keyed for $ty {
            fn key(&self) -> &EntityId {
                &self.id
            }
        })*
    };
}

keyed_by_id!(
    Product,
    Transaction,
    Account,
    AccountTransaction,
    CashRegister,
    InventoryLog
);

/// A collection of entities keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: BTreeMap<EntityId, T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: Keyed> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.items.get_mut(id)
    }

    /// Insert or replace an entity.
    pub fn insert(&mut self, item: T) {
        self.items.insert(item.key().clone(), item);
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.items.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.values_mut()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// All cached entities of one device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCache {
    pub products: Collection<Product>,
    pub transactions: Collection<Transaction>,
    pub accounts: Collection<Account>,
    pub account_transactions: Collection<AccountTransaction>,
    pub prepaid: Vec<PrepaidProduct>,
    pub cash_registers: Collection<CashRegister>,
    pub inventory_logs: Collection<InventoryLog>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a product sharing a name or barcode.
    pub fn find_colliding_product(&self, name: &str, barcode: Option<&str>) -> Option<&Product> {
        self.products.iter().find(|p| p.collides_with(name, barcode))
    }

    /// Change the stock of a cached product. Returns false if it is unknown.
    pub fn adjust_stock(&mut self, product_id: &str, delta: i64) -> bool {
        match self.products.get_mut(product_id) {
            Some(product) => {
                product.stock += delta;
                true
            }
            None => false,
        }
    }

    pub fn prepaid(&self, account_id: &str, product_id: &str) -> Option<&PrepaidProduct> {
        self.prepaid
            .iter()
            .find(|p| p.account_id == account_id && p.product_id == product_id)
    }

    pub fn prepaid_for_account<'a>(
        &'a self,
        account_id: &'a str,
    ) -> impl Iterator<Item = &'a PrepaidProduct> {
        self.prepaid.iter().filter(move |p| p.account_id == account_id)
    }

    /// Fold an account transaction into prepaid counters and stock.
    ///
    /// Mirrors the server rules: prepaid counters move on every prepaid
    /// transaction (a debit never creates a counter row), and stock only
    /// moves for prepaid credits and accumulated debits.
    pub fn fold_account_transaction(&mut self, tx: &AccountTransaction) {
        let Some(account_id) = tx.account_id.as_deref() else {
            return;
        };

        if tx.account_type == crate::entity::AccountType::Prepaid {
            for item in &tx.items {
                let existing = self
                    .prepaid
                    .iter_mut()
                    .find(|p| p.account_id == account_id && p.product_id == item.product_id);
                match existing {
                    Some(counter) => counter.record(tx.kind, item.quantity),
                    None if tx.kind == crate::entity::AccountTxKind::Credit => {
                        self.prepaid.push(PrepaidProduct {
                            account_id: account_id.to_string(),
                            product_id: item.product_id.clone(),
                            paid: item.quantity,
                            consumed: 0,
                        });
                    }
                    None => {}
                }
            }
        }

        if tx.moves_stock() {
            for item in &tx.items {
                self.adjust_stock(&item.product_id, -item.quantity);
            }
        }
    }

    /// Mark every transaction of an account closed.
    pub fn close_account_transactions(&mut self, account_id: &str) -> usize {
        let mut closed = 0;
        for tx in self.account_transactions.iter_mut() {
            if tx.account_id.as_deref() == Some(account_id) {
                tx.status = TransactionStatus::Closed;
                closed += 1;
            }
        }
        closed
    }

    pub fn account_transactions_for<'a>(
        &'a self,
        account_id: &'a str,
    ) -> impl Iterator<Item = &'a AccountTransaction> {
        self.account_transactions
            .iter()
            .filter(move |t| t.account_id.as_deref() == Some(account_id))
    }

    /// The register currently open on this device, if any.
    pub fn open_register(&self) -> Option<&CashRegister> {
        self.cash_registers
            .iter()
            .find(|r| r.status == RegisterStatus::Open)
    }

    /// Drop every cached entity of one kind.
    pub fn clear(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Product => self.products.clear(),
            EntityKind::Transaction => self.transactions.clear(),
            EntityKind::AccountTransaction => {
                self.account_transactions.clear();
                self.prepaid.clear();
            }
            EntityKind::CashRegister => self.cash_registers.clear(),
            EntityKind::InventoryLog => self.inventory_logs.clear(),
            EntityKind::SalesRecord | EntityKind::Report => {}
        }
    }
}
