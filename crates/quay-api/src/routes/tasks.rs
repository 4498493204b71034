//! Task routes.
//!
//! - `POST /v1/tasks` - Desire a task
//! - `GET  /v1/tasks` - List tasks, optionally by domain
//! - `GET  /v1/tasks/{task_guid}` - Get a task
//! - `DELETE /v1/tasks/{task_guid}` - Resolve and remove a completed task
//! - `POST /v1/tasks/{task_guid}/cancel` - Cancel a pending or running task

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use quay_core::Error as CoreError;
use quay_models::{Task, Validate as _};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Optional domain filter for list endpoints.
#[derive(Debug, Deserialize)]
pub struct DomainFilter {
    /// Restrict results to this domain.
    pub domain: Option<String>,
}

/// Task route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:task_guid", get(get_task).delete(delete_task))
        .route("/tasks/:task_guid/cancel", post(cancel_task))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Task>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(task) = body.map_err(|err| ApiError::invalid_json(err.to_string()))?;
    task.validate()
        .map_err(|err| ApiError::invalid_task(err.to_string()))?;
    state.store.desire_task(task).await?;
    Ok(StatusCode::CREATED)
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<DomainFilter>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = match filter.domain {
        Some(domain) => state.store.tasks_by_domain(&domain).await?,
        None => state.store.tasks().await?,
    };
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_guid): Path<String>,
) -> ApiResult<Json<Task>> {
    let task = state.store.task_by_guid(&task_guid).await?;
    Ok(Json(task))
}

/// Resolution is two steps so a concurrent callback worker and a client
/// delete cannot both remove the task.
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_guid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .store
        .resolving_task(&task_guid)
        .await
        .map_err(|err| match err {
            CoreError::InvalidStateTransition { .. } => ApiError::task_not_deletable(format!(
                "task {task_guid} cannot be deleted in its current state"
            )),
            other => other.into(),
        })?;
    state.store.resolve_task(&task_guid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Path(task_guid): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.cancel_task(&task_guid).await?;
    Ok(StatusCode::OK)
}
