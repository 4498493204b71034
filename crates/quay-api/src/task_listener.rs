//! Internal task-completion listener.
//!
//! A loopback-only second listener the store calls when a task completes:
//! `POST /internal/v1/completed_tasks` with the task JSON. The guid is
//! handed to the callback worker pool and the request is acknowledged
//! with 202; delivery happens asynchronously.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;

use quay_models::Task;
use quay_runtime::{CallbackQueue, Shutdown};

use crate::error::{ApiError, ApiResult};

/// Builds the internal listener's router.
pub fn listener_router(queue: CallbackQueue) -> Router {
    Router::new()
        .route("/internal/v1/completed_tasks", post(task_completed))
        .with_state(queue)
}

async fn task_completed(
    State(queue): State<CallbackQueue>,
    body: Result<Json<Task>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(task) = body.map_err(|err| ApiError::invalid_json(err.to_string()))?;
    tracing::debug!(task_guid = %task.task_guid, "Completed task received");
    queue.enqueue(task.task_guid);
    Ok(StatusCode::ACCEPTED)
}

/// Serves the internal listener until shutdown.
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound or the
/// connection loop fails.
pub async fn serve_task_listener(
    address: &str,
    queue: CallbackQueue,
    mut shutdown: Shutdown,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    tracing::info!(address, "Task-completion listener listening");
    axum::serve(listener, listener_router(queue))
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
}
