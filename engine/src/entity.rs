//! Domain entities carried inside operation payloads.
//!
//! These are the shapes shared by the local replica on each device and the
//! authoritative store on the server. All of them serialize with camelCase
//! keys; unknown keys are ignored so older clients can keep sending extra
//! fields.

use crate::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// A sellable product with its stock count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub cost: f64,
    pub stock: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Product {
    /// Whether `other` would be considered the same product by the
    /// name-or-barcode dedup rule.
    pub fn collides_with(&self, name: &str, barcode: Option<&str>) -> bool {
        if self.name == name {
            return true;
        }
        matches!((self.barcode.as_deref(), barcode), (Some(a), Some(b)) if !a.is_empty() && a == b)
    }
}

/// Reference to a product by id (delete payload).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: EntityId,
}

/// How a POS sale was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Transfer,
}

/// Status shared by POS and account transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Active,
    Cancelled,
    Closed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "active",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Closed => "closed",
        }
    }
}

/// One line of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub product_id: EntityId,
    pub quantity: i64,
    pub price: f64,
}

impl TransactionItem {
    pub fn new(product_id: impl Into<EntityId>, quantity: i64, price: f64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            price,
        }
    }

    pub fn line_total(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

/// A point-of-sale transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: EntityId,
    pub amount: f64,
    #[serde(default)]
    pub discount: f64,
    #[serde(rename = "type", default)]
    pub payment: PaymentMethod,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub status: TransactionStatus,
    pub items: Vec<TransactionItem>,
}

/// Billing model of a customer account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountType {
    /// Customer pays up front and consumes later.
    Prepaid,
    /// Customer consumes first and settles later.
    Accumulated,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Prepaid => "PREPAID",
            AccountType::Accumulated => "ACCUMULATED",
        }
    }

    pub fn sale_source(&self) -> SaleSource {
        match self {
            AccountType::Prepaid => SaleSource::Prepaid,
            AccountType::Accumulated => SaleSource::Accumulated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Open,
    Closed,
}

/// A customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: EntityId,
    pub customer_name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub status: AccountStatus,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_limit: Option<f64>,
}

impl Account {
    pub fn is_open(&self) -> bool {
        self.status == AccountStatus::Open
    }

    pub fn close(&mut self, at: DateTime<Utc>, by: impl Into<String>) {
        self.status = AccountStatus::Closed;
        self.closed_at = Some(at);
        self.closed_by = Some(by.into());
    }
}

/// Direction of money on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountTxKind {
    Credit,
    Debit,
}

impl AccountTxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountTxKind::Credit => "credit",
            AccountTxKind::Debit => "debit",
        }
    }
}

/// A movement on a customer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTransaction {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<EntityId>,
    pub account_type: AccountType,
    #[serde(rename = "type")]
    pub kind: AccountTxKind,
    pub amount: f64,
    #[serde(default)]
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<TransactionItem>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
}

impl AccountTransaction {
    /// Whether this movement takes goods out of inventory.
    ///
    /// Prepaid goods leave when they are bought (credit); accumulated goods
    /// leave when they are consumed (debit).
    pub fn moves_stock(&self) -> bool {
        matches!(
            (self.account_type, self.kind),
            (AccountType::Prepaid, AccountTxKind::Credit)
                | (AccountType::Accumulated, AccountTxKind::Debit)
        )
    }
}

/// Paid/consumed counters of one product on a prepaid account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepaidProduct {
    pub account_id: EntityId,
    pub product_id: EntityId,
    pub paid: i64,
    pub consumed: i64,
}

impl PrepaidProduct {
    pub fn remaining(&self) -> i64 {
        self.paid - self.consumed
    }

    /// Fold one account movement into the counters.
    pub fn record(&mut self, kind: AccountTxKind, quantity: i64) {
        match kind {
            AccountTxKind::Credit => self.paid += quantity,
            AccountTxKind::Debit => self.consumed += quantity,
        }
    }
}

/// Directives carried by an account-transaction `update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum AccountDirective {
    Close(AccountClose),
}

/// Close an account and every transaction on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountClose {
    pub account_id: EntityId,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterStatus {
    #[default]
    Open,
    Closed,
}

impl RegisterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterStatus::Open => "open",
            RegisterStatus::Closed => "closed",
        }
    }
}

/// Cash drawer state of one terminal shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashRegister {
    pub id: EntityId,
    #[serde(default)]
    pub status: RegisterStatus,
    pub initial_amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<f64>,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub user_id: String,
}

/// Where revenue came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaleSource {
    Pos,
    Prepaid,
    Accumulated,
}

impl SaleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleSource::Pos => "POS",
            SaleSource::Prepaid => "PREPAID",
            SaleSource::Accumulated => "ACCUMULATED",
        }
    }
}

/// One product line of a sales entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLine {
    pub product_id: EntityId,
    pub quantity: i64,
    pub price: f64,
    pub total: f64,
}

/// Revenue derived from a transaction. Unique per `(source_id, source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesRecord {
    pub source_id: EntityId,
    pub source: SaleSource,
    #[serde(default)]
    pub user_id: String,
    pub total: f64,
    #[serde(default)]
    pub lines: Vec<SaleLine>,
    pub created_at: DateTime<Utc>,
}

impl SalesRecord {
    /// Derive a sales entry from transaction lines.
    pub fn from_items(
        source: SaleSource,
        source_id: impl Into<EntityId>,
        user_id: impl Into<String>,
        items: &[TransactionItem],
        created_at: DateTime<Utc>,
    ) -> Self {
        let lines: Vec<SaleLine> = items
            .iter()
            .map(|item| SaleLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                price: item.price,
                total: item.line_total(),
            })
            .collect();
        let total = lines.iter().map(|l| l.total).sum();

        Self {
            source_id: source_id.into(),
            source,
            user_id: user_id.into(),
            total,
            lines,
            created_at,
        }
    }
}

/// A generated report to be archived in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub filename: String,
    pub content: String,
}

/// Audit entry for a manual inventory action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLog {
    pub id: EntityId,
    pub product_id: EntityId,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub user_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
}
