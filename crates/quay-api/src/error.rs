//! API error types and HTTP response mapping.
//!
//! Every error leaves the server as `{"name": "<kind>", "message": "..."}`
//! with the status code the kind implies. The `name` field is the stable
//! contract clients dispatch on.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use quay_core::Error as CoreError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ApiErrorBody {
    /// Stable machine-readable error name.
    pub name: String,
    /// Human-readable message.
    pub message: String,
}

/// HTTP API error with a stable machine-readable name.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    name: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, name: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            name,
            message: message.into(),
        }
    }

    /// 409 for a duplicate task guid.
    pub fn task_guid_already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "TaskGuidAlreadyExists", message)
    }

    /// 409 for deleting a task outside COMPLETED/RESOLVING.
    pub fn task_not_deletable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "TaskNotDeletable", message)
    }

    /// 404 for an unknown task guid.
    pub fn task_not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "TaskNotFound", message)
    }

    /// 400 for a task that fails validation.
    pub fn invalid_task(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidTask", message)
    }

    /// 409 for a duplicate desired LRP.
    pub fn desired_lrp_already_exists(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "DesiredLRPAlreadyExists", message)
    }

    /// 404 for an unknown desired LRP.
    pub fn desired_lrp_not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "DesiredLRPNotFound", message)
    }

    /// 400 for a desired LRP (or update) that fails validation.
    pub fn invalid_lrp(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidLRP", message)
    }

    /// 400 for a bad domain upsert.
    pub fn invalid_domain(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidDomain", message)
    }

    /// 400 for an undecodable request body.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidJSON", message)
    }

    /// 400 for a structurally bad request outside body decoding.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidRequest", message)
    }

    /// 500 when a response cannot be encoded.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InvalidResponse", message)
    }

    /// 500 for anything without a more specific kind.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "UnknownError", message)
    }

    /// 401 for missing or wrong credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", message)
    }

    /// 404 for an actual LRP index with no instance and no evacuating record.
    pub fn actual_lrp_index_not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "ActualLRPIndexNotFound", message)
    }

    /// 409 for an optimistic-concurrency loss at the store.
    pub fn resource_conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "ResourceConflict", message)
    }

    /// 502 for a routing-tier failure.
    pub fn router_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "RouterError", message)
    }

    /// The HTTP status code for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The stable error name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match &err {
            CoreError::ResourceNotFound { resource_type, .. } => match *resource_type {
                "task" => Self::task_not_found(err.to_string()),
                "desired LRP" => Self::desired_lrp_not_found(err.to_string()),
                "actual LRP" => Self::actual_lrp_index_not_found(err.to_string()),
                _ => Self::unknown(err.to_string()),
            },
            CoreError::ResourceExists { resource_type, .. } => match *resource_type {
                "task" => Self::task_guid_already_exists(err.to_string()),
                "desired LRP" => Self::desired_lrp_already_exists(err.to_string()),
                _ => Self::resource_conflict(err.to_string()),
            },
            CoreError::ResourceConflict { .. } | CoreError::InvalidStateTransition { .. } => {
                Self::resource_conflict(err.to_string())
            }
            CoreError::Internal { .. } => Self::unknown(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            name: self.name.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
