//! Domain routes.
//!
//! - `PUT /v1/domains/{domain}` - Refresh a domain label with a TTL
//! - `GET /v1/domains` - List active domain labels
//!
//! The TTL travels in `Cache-Control: max-age=N`. No header means the
//! domain never expires; a `Cache-Control` without `max-age` is a client
//! error.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Domain route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/domains", get(list_domains))
        .route("/domains/:domain", put(upsert_domain))
}

async fn upsert_domain(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    if domain.trim().is_empty() {
        return Err(ApiError::invalid_domain("domain must be non-empty"));
    }
    let ttl = ttl_from_headers(&headers)?;
    state.store.upsert_domain(&domain, ttl).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_domains(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    let domains = state.store.domains().await?;
    Ok(Json(domains))
}

fn ttl_from_headers(headers: &HeaderMap) -> Result<u32, ApiError> {
    let Some(value) = headers.get(header::CACHE_CONTROL) else {
        return Ok(0);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::invalid_request("Cache-Control header is not valid text"))?;
    raw.split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .ok_or_else(|| ApiError::invalid_request("Cache-Control header is missing max-age"))?
        .parse::<u32>()
        .map_err(|err| ApiError::invalid_request(format!("max-age must be a u32: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_absent_header_means_no_expiry() {
        assert_eq!(ttl_from_headers(&HeaderMap::new()).unwrap(), 0);
    }

    #[test]
    fn test_max_age_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("public, max-age=100"),
        );
        assert_eq!(ttl_from_headers(&headers).unwrap(), 100);
    }

    #[test]
    fn test_header_without_max_age_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        assert!(ttl_from_headers(&headers).is_err());
    }
}
