//! Sync endpoint routes.

use axum::{extract::State, routing::post, Json, Router};
use tally_engine::{SyncRequest, SyncResponse};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_handler))
}

/// POST /sync - push pending operations, pull everyone else's.
async fn sync_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    let response = state.sync.reconcile(request, &auth.identity).await?;
    Ok(Json(response))
}
