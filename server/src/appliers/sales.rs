use super::{ApplyContext, ApplyResult};
use tally_engine::{ApplyOutcome, SalesRecord};

pub(super) async fn create(ctx: &ApplyContext<'_>, record: &SalesRecord) -> ApplyResult {
    let mut session = ctx.db.session().await?;
    if session.record_sale(record).await? {
        Ok(ApplyOutcome::Applied)
    } else {
        tracing::debug!(
            source_id = %record.source_id,
            source = record.source.as_str(),
            "Sales entry already recorded, skipping"
        );
        Ok(ApplyOutcome::Skipped)
    }
}
