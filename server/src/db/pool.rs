//! Database connection pool management.

use super::{Database, Session, StoreError, StoreResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres};

/// Type alias for the database pool.
pub type Pool = PgPool;

/// Create a new database connection pool.
pub async fn create_pool(database_url: &str) -> Result<Pool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgDatabase {
    pool: Pool,
}

impl PgDatabase {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = create_pool(database_url).await?;
        tracing::info!("Running database migrations...");
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession {
            conn: PgConn::Autocommit(conn),
        }))
    }

    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession {
            conn: PgConn::Transaction(tx),
        }))
    }
}

enum PgConn {
    Autocommit(PoolConnection<Postgres>),
    Transaction(sqlx::Transaction<'static, Postgres>),
}

/// A pooled connection, optionally inside a transaction.
///
/// The ledger queries live in `operations.rs`, the entity queries in
/// `records.rs`.
pub struct PgSession {
    conn: PgConn,
}

impl PgSession {
    pub(super) fn conn(&mut self) -> &mut PgConnection {
        match &mut self.conn {
            PgConn::Autocommit(conn) => &mut **conn,
            PgConn::Transaction(tx) => &mut **tx,
        }
    }
}

#[async_trait]
impl Session for PgSession {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        match self.conn {
            PgConn::Transaction(tx) => tx.commit().await?,
            PgConn::Autocommit(_) => {}
        }
        Ok(())
    }
}

/// Store a unit enum as its serde tag.
pub(super) fn tag<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Read back a value written by [`tag`].
pub(super) fn parse_tag<T: DeserializeOwned>(column: &str, value: String) -> StoreResult<T> {
    serde_json::from_value(serde_json::Value::String(value))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

/// Check if a SQL error is a unique constraint violation.
pub(super) fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = e {
        // PostgreSQL unique violation code is "23505"
        db_err.code().map(|c| c == "23505").unwrap_or(false)
    } else {
        false
    }
}
