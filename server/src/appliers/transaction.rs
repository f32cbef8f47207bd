//! POS transactions.

use super::{ApplyContext, ApplyResult};
use tally_engine::{ApplyOutcome, SaleSource, SalesRecord, Transaction};

/// Store the sale, take its items out of stock and derive one POS sales
/// entry, all in one store transaction.
pub(super) async fn create(ctx: &ApplyContext<'_>, mut transaction: Transaction) -> ApplyResult {
    transaction.user_id = ctx.audit_user(&transaction.user_id);

    let mut tx = ctx.db.begin().await?;

    if tx.transaction_exists(&transaction.id).await? {
        tracing::debug!(transaction_id = %transaction.id, "Transaction already exists, skipping");
        return Ok(ApplyOutcome::Skipped);
    }

    tx.insert_transaction(&transaction).await?;

    for item in &transaction.items {
        tx.adjust_stock(&item.product_id, -item.quantity).await?;
    }

    let mut sale = SalesRecord::from_items(
        SaleSource::Pos,
        &transaction.id,
        &transaction.user_id,
        &transaction.items,
        transaction.created_at,
    );
    // Revenue is what was charged, after discount.
    sale.total = transaction.amount;
    tx.record_sale(&sale).await?;

    tx.commit().await?;

    tracing::debug!(
        transaction_id = %transaction.id,
        items = transaction.items.len(),
        amount = transaction.amount,
        "Transaction applied"
    );
    Ok(ApplyOutcome::Applied)
}
