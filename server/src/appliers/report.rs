use super::{ApplyContext, ApplyResult};
use tally_engine::{ApplyOutcome, Report};

/// Best-effort archive. An upload failure never fails the operation.
pub(super) async fn create(ctx: &ApplyContext<'_>, report: &Report) -> ApplyResult {
    match ctx
        .uploader
        .upload_csv(&report.content, &report.filename)
        .await
    {
        Ok(url) => tracing::info!(filename = %report.filename, %url, "Report uploaded"),
        Err(e) => tracing::warn!(filename = %report.filename, "Report upload failed: {}", e),
    }
    Ok(ApplyOutcome::Applied)
}
