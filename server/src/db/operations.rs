//! Database operations for the operations ledger.

use super::pool::{is_unique_violation, parse_tag};
use super::{Ledger, PgSession, StoreResult};
use async_trait::async_trait;
use sqlx::Row;
use tally_engine::{OpStatus, Operation, Timestamp};

/// A stored ledger row.
#[derive(Debug)]
struct StoredOperation {
    id: String,
    timestamp: i64,
    op_type: String,
    entity: String,
    data: String,
    device_id: String,
    status: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredOperation {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredOperation {
            id: row.try_get("id")?,
            timestamp: row.try_get("timestamp")?,
            op_type: row.try_get("op_type")?,
            entity: row.try_get("entity")?,
            data: row.try_get("data")?,
            device_id: row.try_get("device_id")?,
            status: row.try_get("status")?,
        })
    }
}

impl StoredOperation {
    fn into_operation(self) -> StoreResult<Operation> {
        Ok(Operation {
            id: self.id,
            timestamp: self.timestamp,
            op_type: parse_tag("op_type", self.op_type)?,
            entity: parse_tag("entity", self.entity)?,
            data: self.data,
            device_id: self.device_id,
            status: parse_tag("status", self.status)?,
        })
    }
}

#[async_trait]
impl Ledger for PgSession {
    async fn insert_operation(&mut self, op: &Operation) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO operations (id, timestamp, op_type, entity, data, device_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&op.id)
        .bind(op.timestamp)
        .bind(op.op_type.as_str())
        .bind(op.entity.as_str())
        .bind(&op.data)
        .bind(&op.device_id)
        .bind(OpStatus::Pending.as_str())
        .execute(self.conn())
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_operation_status(&mut self, id: &str, status: OpStatus) -> StoreResult<()> {
        sqlx::query("UPDATE operations SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.conn())
            .await?;
        Ok(())
    }

    async fn find_operation(&mut self, id: &str) -> StoreResult<Option<Operation>> {
        let stored = sqlx::query_as::<_, StoredOperation>(
            r#"
            SELECT id, timestamp, op_type, entity, data, device_id, status
            FROM operations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.conn())
        .await?;

        stored.map(StoredOperation::into_operation).transpose()
    }

    async fn completed_since(
        &mut self,
        since: Timestamp,
        exclude_device: &str,
    ) -> StoreResult<Vec<Operation>> {
        let rows = sqlx::query_as::<_, StoredOperation>(
            r#"
            SELECT id, timestamp, op_type, entity, data, device_id, status
            FROM operations
            WHERE timestamp > $1 AND device_id <> $2 AND status = $3
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(since)
        .bind(exclude_device)
        .bind(OpStatus::Completed.as_str())
        .fetch_all(self.conn())
        .await?;

        rows.into_iter()
            .map(StoredOperation::into_operation)
            .collect()
    }
}
