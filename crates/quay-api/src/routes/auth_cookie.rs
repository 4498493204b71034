//! Cookie minting for browser SSE clients.
//!
//! - `POST /v1/auth_cookie` - Mirror the `Authorization` header into the
//!   authorization cookie (an empty header clears it)

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AUTHORIZATION_COOKIE;
use crate::server::AppState;

/// Auth cookie route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth_cookie", post(generate_cookie))
}

async fn generate_cookie(headers: HeaderMap) -> ApiResult<impl IntoResponse> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::invalid_request("Authorization header is not valid text"))
        })
        .transpose()?
        .unwrap_or_default();

    let cookie = if authorization.is_empty() {
        format!("{AUTHORIZATION_COOKIE}=; Max-Age=0; HttpOnly")
    } else {
        format!("{AUTHORIZATION_COOKIE}=\"{authorization}\"; HttpOnly")
    };
    let cookie = HeaderValue::from_str(&cookie)
        .map_err(|_| ApiError::invalid_request("Authorization header is not cookie-safe"))?;

    Ok(([(header::SET_COOKIE, cookie)], StatusCode::NO_CONTENT))
}
