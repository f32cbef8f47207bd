//! Typed operation payloads.
//!
//! On the wire the payload is an opaque JSON string whose shape depends on
//! the `entity` tag. [`EntityPayload`] is the validated form: decoding picks
//! the concrete structure from `(entity, type)` so appliers never look at
//! untyped maps.

use crate::entity::{
    AccountDirective, AccountTransaction, CashRegister, InventoryLog, Product, ProductRef,
    Report, SalesRecord, Transaction,
};
use crate::{error::Result, EntityKind, Error, OpType};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A decoded operation payload, one variant per supported `(entity, type)`.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    ProductCreate(Product),
    ProductUpdate(Product),
    ProductDelete(ProductRef),
    TransactionCreate(Transaction),
    AccountTransactionCreate(AccountTransaction),
    AccountDirective(AccountDirective),
    CashRegisterCreate(CashRegister),
    CashRegisterUpdate(CashRegister),
    SalesRecordCreate(SalesRecord),
    ReportCreate(Report),
    InventoryLogCreate(InventoryLog),
}

impl EntityPayload {
    /// Decode a wire payload.
    pub fn decode(kind: EntityKind, op_type: OpType, data: &str) -> Result<Self> {
        use EntityKind as K;
        use OpType as T;

        match (kind, op_type) {
            (K::Product, T::Create) => parse(kind, op_type, data).map(Self::ProductCreate),
            (K::Product, T::Update) => parse(kind, op_type, data).map(Self::ProductUpdate),
            (K::Product, T::Delete) => parse(kind, op_type, data).map(Self::ProductDelete),
            (K::Transaction, T::Create) => {
                parse(kind, op_type, data).map(Self::TransactionCreate)
            }
            (K::AccountTransaction, T::Create) => {
                parse(kind, op_type, data).map(Self::AccountTransactionCreate)
            }
            (K::AccountTransaction, T::Update) => {
                parse(kind, op_type, data).map(Self::AccountDirective)
            }
            (K::CashRegister, T::Create) => {
                parse(kind, op_type, data).map(Self::CashRegisterCreate)
            }
            (K::CashRegister, T::Update) => {
                parse(kind, op_type, data).map(Self::CashRegisterUpdate)
            }
            (K::SalesRecord, T::Create) => parse(kind, op_type, data).map(Self::SalesRecordCreate),
            (K::Report, T::Create) => parse(kind, op_type, data).map(Self::ReportCreate),
            (K::InventoryLog, T::Create) => {
                parse(kind, op_type, data).map(Self::InventoryLogCreate)
            }
            _ => Err(Error::UnsupportedOperation { kind, op_type }),
        }
    }

    /// Encode into the wire `data` string.
    pub fn encode(&self) -> Result<String> {
        let (kind, op_type) = (self.kind(), self.op_type());
        match self {
            Self::ProductCreate(p) | Self::ProductUpdate(p) => render(kind, op_type, p),
            Self::ProductDelete(r) => render(kind, op_type, r),
            Self::TransactionCreate(t) => render(kind, op_type, t),
            Self::AccountTransactionCreate(t) => render(kind, op_type, t),
            Self::AccountDirective(d) => render(kind, op_type, d),
            Self::CashRegisterCreate(r) | Self::CashRegisterUpdate(r) => render(kind, op_type, r),
            Self::SalesRecordCreate(s) => render(kind, op_type, s),
            Self::ReportCreate(r) => render(kind, op_type, r),
            Self::InventoryLogCreate(l) => render(kind, op_type, l),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::ProductCreate(_) | Self::ProductUpdate(_) | Self::ProductDelete(_) => {
                EntityKind::Product
            }
            Self::TransactionCreate(_) => EntityKind::Transaction,
            Self::AccountTransactionCreate(_) | Self::AccountDirective(_) => {
                EntityKind::AccountTransaction
            }
            Self::CashRegisterCreate(_) | Self::CashRegisterUpdate(_) => EntityKind::CashRegister,
            Self::SalesRecordCreate(_) => EntityKind::SalesRecord,
            Self::ReportCreate(_) => EntityKind::Report,
            Self::InventoryLogCreate(_) => EntityKind::InventoryLog,
        }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            Self::ProductUpdate(_) | Self::AccountDirective(_) | Self::CashRegisterUpdate(_) => {
                OpType::Update
            }
            Self::ProductDelete(_) => OpType::Delete,
            _ => OpType::Create,
        }
    }
}

fn parse<T: DeserializeOwned>(kind: EntityKind, op_type: OpType, data: &str) -> Result<T> {
    serde_json::from_str(data).map_err(|e| Error::InvalidPayload {
        kind,
        op_type,
        message: e.to_string(),
    })
}

fn render<T: Serialize>(kind: EntityKind, op_type: OpType, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::InvalidPayload {
        kind,
        op_type,
        message: e.to_string(),
    })
}
