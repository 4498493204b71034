//! HTTP route handlers.

pub mod actual_lrps;
pub mod auth_cookie;
pub mod cells;
pub mod domains;
pub mod events;
pub mod lrps;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

/// The `/v1` route table.
pub fn v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(tasks::routes())
        .merge(lrps::routes())
        .merge(actual_lrps::routes())
        .merge(cells::routes())
        .merge(domains::routes())
        .merge(events::routes())
        .merge(auth_cookie::routes())
}
