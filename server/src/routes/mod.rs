//! HTTP surface: the sync exchange plus liveness checks.

mod health;
mod sync;

use crate::AppState;
use axum::Router;

/// Every route the server answers, before layers and state are attached.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(sync::routes())
        .merge(health::routes())
}
