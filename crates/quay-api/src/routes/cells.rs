//! Cell routes.
//!
//! - `GET /v1/cells` - The live cell presences

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use quay_models::CellPresence;

use crate::error::ApiResult;
use crate::server::AppState;

/// Cell route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/cells", get(list_cells))
}

async fn list_cells(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<CellPresence>>> {
    let cells = state.store.cells().await?;
    Ok(Json(cells))
}
