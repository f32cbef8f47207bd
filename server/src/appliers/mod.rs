//! Entity appliers.
//!
//! One module per entity kind. Each applier is an idempotent merge of one
//! decoded operation into the authoritative store: replays and duplicates
//! come back as [`ApplyOutcome::Skipped`], and compound changes run inside a
//! single store transaction so a failure leaves nothing behind.

mod account;
mod cash_register;
mod inventory;
mod product;
mod report;
mod sales;
mod transaction;

use crate::config::ProductDedup;
use crate::db::{Database, StoreError};
use crate::upload::DocumentUploader;
use tally_engine::{
    AccountDirective, ApplyOutcome, EntityId, EntityPayload, Identity, Operation,
};

/// Why an operation could not be applied. Recorded as `failed` in the ledger.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Payload(#[from] tally_engine::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("account not found: {0}")]
    UnknownAccount(EntityId),
}

pub type ApplyResult = Result<ApplyOutcome, ApplyError>;

/// Everything an applier may touch while merging one operation.
pub struct ApplyContext<'a> {
    pub db: &'a dyn Database,
    pub uploader: &'a dyn DocumentUploader,
    pub product_dedup: ProductDedup,
    pub caller: &'a Identity,
}

impl ApplyContext<'_> {
    /// Audit user for a row: the payload's own user, or the caller.
    fn audit_user(&self, user_id: &str) -> String {
        if user_id.is_empty() {
            self.caller.id.clone()
        } else {
            user_id.to_string()
        }
    }
}

/// Decode an operation and dispatch it to the applier for its kind.
pub async fn apply(ctx: &ApplyContext<'_>, op: &Operation) -> ApplyResult {
    match op.decode()? {
        EntityPayload::ProductCreate(product) => product::create(ctx, &product).await,
        EntityPayload::ProductUpdate(product) => product::update(ctx, &product).await,
        EntityPayload::ProductDelete(target) => product::delete(ctx, &target.id).await,
        EntityPayload::TransactionCreate(transaction) => {
            transaction::create(ctx, transaction).await
        }
        EntityPayload::AccountTransactionCreate(tx) => account::create(ctx, tx).await,
        EntityPayload::AccountDirective(AccountDirective::Close(close)) => {
            account::close(ctx, &close).await
        }
        EntityPayload::CashRegisterCreate(register)
        | EntityPayload::CashRegisterUpdate(register) => {
            cash_register::upsert(ctx, register).await
        }
        EntityPayload::SalesRecordCreate(record) => sales::create(ctx, &record).await,
        EntityPayload::ReportCreate(report) => report::create(ctx, &report).await,
        EntityPayload::InventoryLogCreate(log) => inventory::create(ctx, log).await,
    }
}
