//! Tally Server - reconciliation server for offline point-of-sale terminals.

use std::sync::Arc;
use tally_server::{build_router, connect_database, document_uploader, AppState, Config, Reconciler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        store = ?config.store,
        product_dedup = ?config.product_dedup,
        "Starting Tally Server on {}",
        config.bind_address()
    );

    let db = connect_database(&config).await?;
    let reconciler = Reconciler::new(db)
        .with_uploader(document_uploader(&config))
        .with_product_dedup(config.product_dedup);

    let addr = config.bind_address();
    let app = build_router(AppState::new(Arc::new(reconciler), config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
