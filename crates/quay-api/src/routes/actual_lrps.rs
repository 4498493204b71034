//! Actual LRP routes (read-only, plus retirement).
//!
//! - `GET /v1/actual_lrps` - List resolved actual LRPs, optionally by domain
//! - `GET /v1/actual_lrps/{process_guid}` - Resolved actual LRPs for a process
//! - `GET /v1/actual_lrps/{process_guid}/index/{index}` - Resolve one instance
//! - `DELETE /v1/actual_lrps/{process_guid}/index/{index}` - Retire one instance
//!
//! Each group resolves to a single record: the instance unless it is
//! UNCLAIMED or CLAIMED while an evacuating record exists, in which case
//! the evacuating record wins and is flagged.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use quay_models::{ActualLRPGroup, ResolvedActualLRP};

use super::tasks::DomainFilter;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Actual LRP route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/actual_lrps", get(list_actual_lrps))
        .route("/actual_lrps/:process_guid", get(list_actual_lrps_by_process))
        .route(
            "/actual_lrps/:process_guid/index/:index",
            get(get_actual_lrp_by_index).delete(retire_actual_lrp_by_index),
        )
}

fn resolve_groups(groups: Vec<ActualLRPGroup>) -> Vec<ResolvedActualLRP> {
    groups
        .into_iter()
        .filter_map(|group| group.resolve().ok())
        .collect()
}

async fn list_actual_lrps(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DomainFilter>,
) -> ApiResult<Json<Vec<ResolvedActualLRP>>> {
    let groups = match filter.domain {
        Some(domain) => state.store.actual_lrp_groups_by_domain(&domain).await?,
        None => state.store.actual_lrp_groups().await?,
    };
    Ok(Json(resolve_groups(groups)))
}

async fn list_actual_lrps_by_process(
    State(state): State<Arc<AppState>>,
    Path(process_guid): Path<String>,
) -> ApiResult<Json<Vec<ResolvedActualLRP>>> {
    let groups = state
        .store
        .actual_lrp_groups_by_process_guid(&process_guid)
        .await?;
    Ok(Json(resolve_groups(groups)))
}

async fn get_actual_lrp_by_index(
    State(state): State<Arc<AppState>>,
    Path((process_guid, index)): Path<(String, String)>,
) -> ApiResult<Json<ResolvedActualLRP>> {
    let index = parse_index(&index)?;
    let group = state
        .store
        .actual_lrp_group_by_process_guid_and_index(&process_guid, index)
        .await?;
    let resolved = group.resolve().map_err(|_| {
        ApiError::actual_lrp_index_not_found(format!(
            "no instance of {process_guid} at index {index}"
        ))
    })?;
    Ok(Json(resolved))
}

/// Retirement is a request to the store, not a synchronous kill; 204
/// acknowledges acceptance.
async fn retire_actual_lrp_by_index(
    State(state): State<Arc<AppState>>,
    Path((process_guid, index)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let index = parse_index(&index)?;
    let group = state
        .store
        .actual_lrp_group_by_process_guid_and_index(&process_guid, index)
        .await?;
    let resolved = group.resolve().map_err(|_| {
        ApiError::actual_lrp_index_not_found(format!(
            "no instance of {process_guid} at index {index}"
        ))
    })?;
    state
        .store
        .retire_actual_lrps(std::slice::from_ref(&resolved.actual_lrp.key))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_index(raw: &str) -> Result<i32, ApiError> {
    raw.parse::<i32>()
        .ok()
        .filter(|index| *index >= 0)
        .ok_or_else(|| ApiError::invalid_request(format!("index must be a non-negative integer (got {raw})")))
}
