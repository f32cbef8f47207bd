use super::{ApplyContext, ApplyResult};
use tally_engine::{ApplyOutcome, CashRegister};

/// Create and update are the same upsert keyed by id.
pub(super) async fn upsert(ctx: &ApplyContext<'_>, mut register: CashRegister) -> ApplyResult {
    register.user_id = ctx.audit_user(&register.user_id);

    let mut session = ctx.db.session().await?;
    session.upsert_cash_register(&register).await?;

    tracing::debug!(
        register_id = %register.id,
        status = register.status.as_str(),
        "Cash register stored"
    );
    Ok(ApplyOutcome::Applied)
}
