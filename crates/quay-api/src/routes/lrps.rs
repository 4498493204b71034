//! Desired LRP routes.
//!
//! - `POST /v1/desired_lrps` - Desire an LRP
//! - `GET  /v1/desired_lrps` - List desired LRPs, optionally by domain
//! - `GET  /v1/desired_lrps/{process_guid}` - Get a desired LRP
//! - `PUT  /v1/desired_lrps/{process_guid}` - Update instances/routes/annotation
//! - `DELETE /v1/desired_lrps/{process_guid}` - Remove a desired LRP

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use quay_models::{DesiredLRP, DesiredLRPUpdate, Validate as _};

use super::tasks::DomainFilter;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Desired LRP route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/desired_lrps", get(list_desired_lrps).post(create_desired_lrp))
        .route(
            "/desired_lrps/:process_guid",
            get(get_desired_lrp)
                .put(update_desired_lrp)
                .delete(delete_desired_lrp),
        )
}

async fn create_desired_lrp(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DesiredLRP>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(lrp) = body.map_err(|err| ApiError::invalid_json(err.to_string()))?;
    lrp.validate()
        .map_err(|err| ApiError::invalid_lrp(err.to_string()))?;
    state.store.desire_lrp(lrp).await?;
    Ok(StatusCode::CREATED)
}

async fn list_desired_lrps(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DomainFilter>,
) -> ApiResult<Json<Vec<DesiredLRP>>> {
    let lrps = match filter.domain {
        Some(domain) => state.store.desired_lrps_by_domain(&domain).await?,
        None => state.store.desired_lrps().await?,
    };
    Ok(Json(lrps))
}

async fn get_desired_lrp(
    State(state): State<Arc<AppState>>,
    Path(process_guid): Path<String>,
) -> ApiResult<Json<DesiredLRP>> {
    let lrp = state.store.desired_lrp_by_process_guid(&process_guid).await?;
    Ok(Json(lrp))
}

async fn update_desired_lrp(
    State(state): State<Arc<AppState>>,
    Path(process_guid): Path<String>,
    body: Result<Json<DesiredLRPUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = body.map_err(|err| ApiError::invalid_json(err.to_string()))?;
    update
        .validate()
        .map_err(|err| ApiError::invalid_lrp(err.to_string()))?;
    state.store.update_desired_lrp(&process_guid, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_desired_lrp(
    State(state): State<Arc<AppState>>,
    Path(process_guid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.remove_desired_lrp(&process_guid).await?;
    Ok(StatusCode::NO_CONTENT)
}
