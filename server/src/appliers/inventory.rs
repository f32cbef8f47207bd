use super::{ApplyContext, ApplyResult};
use tally_engine::{ApplyOutcome, InventoryLog};

pub(super) async fn create(ctx: &ApplyContext<'_>, mut log: InventoryLog) -> ApplyResult {
    log.user_id = ctx.audit_user(&log.user_id);

    let mut session = ctx.db.session().await?;
    if session.find_inventory_log(&log.id).await?.is_some() {
        tracing::debug!(log_id = %log.id, "Inventory log already exists, skipping");
        return Ok(ApplyOutcome::Skipped);
    }
    session.insert_inventory_log(&log).await?;
    Ok(ApplyOutcome::Applied)
}
