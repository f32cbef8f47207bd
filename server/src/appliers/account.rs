//! Account transactions and the account close directive.

use super::{ApplyContext, ApplyError, ApplyResult};
use crate::db::Session;
use tally_engine::{AccountClose, AccountTransaction, AccountType, ApplyOutcome, SalesRecord};

/// Merge one account movement.
///
/// Prepaid accounts keep paid/consumed counters per product; a debit for a
/// product with no counter row leaves the counters alone. Stock and revenue
/// move only when goods leave the store: on a prepaid credit or an
/// accumulated debit.
pub(super) async fn create(ctx: &ApplyContext<'_>, mut movement: AccountTransaction) -> ApplyResult {
    let Some(account_id) = movement.account_id.clone() else {
        tracing::info!(transaction_id = %movement.id, "Account transaction without account, ignoring");
        return Ok(ApplyOutcome::Skipped);
    };
    movement.user_id = ctx.audit_user(&movement.user_id);

    let mut tx = ctx.db.begin().await?;

    if tx.find_account_transaction(&movement.id).await?.is_some() {
        tracing::debug!(transaction_id = %movement.id, "Account transaction already exists, skipping");
        return Ok(ApplyOutcome::Skipped);
    }
    if tx.find_account(&account_id).await?.is_none() {
        return Err(ApplyError::UnknownAccount(account_id));
    }

    tx.insert_account_transaction(&movement).await?;

    if movement.account_type == AccountType::Prepaid {
        fold_prepaid(tx.as_mut(), &account_id, &movement).await?;
    }

    if movement.moves_stock() {
        for item in &movement.items {
            tx.adjust_stock(&item.product_id, -item.quantity).await?;
        }

        let sale = SalesRecord::from_items(
            movement.account_type.sale_source(),
            &movement.id,
            &movement.user_id,
            &movement.items,
            movement.created_at,
        );
        tx.record_sale(&sale).await?;
    }

    tx.commit().await?;

    tracing::debug!(
        transaction_id = %movement.id,
        account_id = %account_id,
        kind = movement.kind.as_str(),
        "Account transaction applied"
    );
    Ok(ApplyOutcome::Applied)
}

async fn fold_prepaid(
    tx: &mut dyn Session,
    account_id: &str,
    movement: &AccountTransaction,
) -> Result<(), ApplyError> {
    for item in &movement.items {
        let written = tx
            .record_prepaid(account_id, &item.product_id, movement.kind, item.quantity)
            .await?;
        if !written {
            tracing::debug!(
                account_id,
                product_id = %item.product_id,
                "Prepaid debit without counter, leaving counters alone"
            );
        }
    }
    Ok(())
}

/// Close the account and every transaction on it.
pub(super) async fn close(ctx: &ApplyContext<'_>, close: &AccountClose) -> ApplyResult {
    let closed_by = ctx.audit_user(&close.user_id);

    let mut tx = ctx.db.begin().await?;

    if !tx
        .close_account(&close.account_id, close.timestamp, &closed_by)
        .await?
    {
        return Err(ApplyError::UnknownAccount(close.account_id.clone()));
    }
    let closed = tx.close_account_transactions(&close.account_id).await?;

    tx.commit().await?;

    tracing::info!(
        account_id = %close.account_id,
        closed_by = %closed_by,
        transactions = closed,
        "Account closed"
    );
    Ok(ApplyOutcome::Applied)
}
