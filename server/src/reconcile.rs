//! Sync reconciliation service.
//!
//! Handles one device request end to end: every incoming operation is
//! deduplicated against the ledger, applied through its entity applier and
//! given a final status, then the device gets back what other devices did
//! since its watermark.
//!
//! Operations in a batch are processed strictly in order. A failing
//! operation is recorded as `failed` and the batch carries on; only a store
//! failure on the ledger itself aborts the request.

use crate::appliers::{self, ApplyContext};
use crate::config::ProductDedup;
use crate::db::Database;
use crate::error::Result;
use crate::upload::{DisabledUploader, DocumentUploader};
use async_trait::async_trait;
use std::sync::Arc;
use tally_engine::{
    initial_operation_id, next_cursor, ApplyOutcome, EntityPayload, Identity, OpStatus, Operation,
    SyncRequest, SyncResponse, Timestamp, SERVER_DEVICE_ID,
};

/// Something that answers sync requests.
#[async_trait]
pub trait SyncService: Send + Sync {
    async fn reconcile(&self, request: SyncRequest, caller: &Identity) -> Result<SyncResponse>;
}

/// What happened to one incoming operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    Applied,
    /// Accepted, but the applier found nothing to change.
    Skipped,
    /// Id already in the ledger; nothing was done.
    Duplicate,
    Failed(String),
}

/// Per-batch tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &OpOutcome) {
        match outcome {
            OpOutcome::Applied => self.applied += 1,
            OpOutcome::Skipped => self.skipped += 1,
            OpOutcome::Duplicate => self.duplicates += 1,
            OpOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Current server wall-clock in milliseconds.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

/// The reconciliation service over a store backend.
pub struct Reconciler {
    db: Arc<dyn Database>,
    uploader: Arc<dyn DocumentUploader>,
    product_dedup: ProductDedup,
}

impl Reconciler {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            uploader: Arc::new(DisabledUploader),
            product_dedup: ProductDedup::default(),
        }
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn DocumentUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    pub fn with_product_dedup(mut self, dedup: ProductDedup) -> Self {
        self.product_dedup = dedup;
        self
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Ingest a batch in order.
    pub async fn process_batch(
        &self,
        operations: &[Operation],
        caller: &Identity,
    ) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for op in operations {
            let outcome = self.process(op, caller).await?;
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Ingest one operation: claim its id in the ledger, apply it, settle
    /// its status.
    pub async fn process(&self, op: &Operation, caller: &Identity) -> Result<OpOutcome> {
        let inserted = {
            let mut session = self.db.session().await?;
            session.insert_operation(op).await?
        };
        if !inserted {
            tracing::debug!(op_id = %op.id, "Operation already processed, skipping");
            return Ok(OpOutcome::Duplicate);
        }

        let ctx = ApplyContext {
            db: self.db.as_ref(),
            uploader: self.uploader.as_ref(),
            product_dedup: self.product_dedup,
            caller,
        };

        let (status, outcome) = match appliers::apply(&ctx, op).await {
            Ok(ApplyOutcome::Applied) => (OpStatus::Completed, OpOutcome::Applied),
            Ok(ApplyOutcome::Skipped) => (OpStatus::Completed, OpOutcome::Skipped),
            Err(e) => {
                tracing::warn!(
                    op_id = %op.id,
                    entity = %op.entity,
                    op_type = %op.op_type,
                    device_id = %op.device_id,
                    "Operation failed: {}",
                    e
                );
                (OpStatus::Failed, OpOutcome::Failed(e.to_string()))
            }
        };

        let mut session = self.db.session().await?;
        session.set_operation_status(&op.id, status).await?;
        Ok(outcome)
    }

    /// Completed operations from other devices newer than `since`.
    pub async fn pull_set(&self, since: Timestamp, device_id: &str) -> Result<Vec<Operation>> {
        let mut session = self.db.session().await?;
        Ok(session.completed_since(since, device_id).await?)
    }

    /// Current products as `create` operations, for a device with no history.
    pub async fn initial_snapshot(&self, now: Timestamp) -> Result<Vec<Operation>> {
        let products = {
            let mut session = self.db.session().await?;
            session.list_products().await?
        };

        products
            .into_iter()
            .map(|product| -> Result<Operation> {
                let id = initial_operation_id(&product.id);
                let op = Operation::from_payload(
                    &EntityPayload::ProductCreate(product),
                    SERVER_DEVICE_ID,
                    now,
                )?;
                Ok(op.with_id(id).with_status(OpStatus::Completed))
            })
            .collect()
    }
}

#[async_trait]
impl SyncService for Reconciler {
    async fn reconcile(&self, request: SyncRequest, caller: &Identity) -> Result<SyncResponse> {
        tracing::info!(
            device_id = %request.device_id,
            user = %caller.id,
            operations = request.operations.len(),
            last_sync = request.last_sync_timestamp,
            "Sync request"
        );

        let report = self.process_batch(&request.operations, caller).await?;

        let now = now_millis();
        let operations = if request.is_initial() {
            self.initial_snapshot(now).await?
        } else {
            self.pull_set(request.last_sync_timestamp, &request.device_id)
                .await?
        };
        let cursor = next_cursor(now, request.last_sync_timestamp);

        tracing::info!(
            device_id = %request.device_id,
            applied = report.applied,
            skipped = report.skipped,
            duplicates = report.duplicates,
            failed = report.failed,
            pulled = operations.len(),
            cursor,
            "Sync complete"
        );

        Ok(SyncResponse::ok(operations, cursor))
    }
}
