//! # Tally Server
//!
//! Authoritative side of Tally sync. Devices post their pending operations
//! to `POST /sync`; the [`Reconciler`] records each one in the operation
//! ledger, merges it into the store through the entity appliers, and
//! answers with the operations other devices made since the caller's
//! watermark.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tally_server::{build_router, AppState, Config, MemoryDatabase, Reconciler};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let reconciler = Reconciler::new(Arc::new(MemoryDatabase::new()));
//! let app = build_router(AppState::new(Arc::new(reconciler), config));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod appliers;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod routes;
pub mod upload;

pub use config::{Config, ConfigError, ProductDedup, StoreKind};
pub use db::{Database, MemoryDatabase, PgDatabase, StoreError};
pub use error::AppError;
pub use reconcile::{BatchReport, OpOutcome, Reconciler, SyncService};
pub use upload::{DisabledUploader, DocumentUploader, HttpDocumentUploader, UploadError};

use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<dyn SyncService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(sync: Arc<dyn SyncService>, config: Config) -> Self {
        Self {
            sync,
            config: Arc::new(config),
        }
    }
}

/// Build the application router with tracing and CORS layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Build the store selected by the configuration.
pub async fn connect_database(config: &Config) -> Result<Arc<dyn Database>, StoreError> {
    match (config.store, config.database_url.as_deref()) {
        (StoreKind::Postgres, Some(url)) => Ok(Arc::new(PgDatabase::connect(url).await?)),
        (StoreKind::Postgres, None) => Err(StoreError::Misconfigured(
            "DATABASE_URL is required for the postgres store",
        )),
        (StoreKind::Memory, _) => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryDatabase::new()))
        }
    }
}

/// Build the uploader selected by the configuration.
pub fn document_uploader(config: &Config) -> Arc<dyn DocumentUploader> {
    match &config.document_upload_url {
        Some(url) => Arc::new(HttpDocumentUploader::new(url.clone())),
        None => {
            tracing::info!("DOCUMENT_UPLOAD_URL not set, report uploads disabled");
            Arc::new(DisabledUploader)
        }
    }
}
