//! Request middleware: cookie-carried credentials, basic auth, CORS.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::error::ApiError;
use crate::server::AppState;

/// Cookie carrying credentials for clients that cannot set headers.
pub const AUTHORIZATION_COOKIE: &str = "receptor_authorization";

/// Copies the authorization cookie into the `Authorization` header.
///
/// Browser SSE clients cannot set request headers; they authenticate by
/// presenting the cookie minted by `POST /v1/auth_cookie` instead. An
/// explicit `Authorization` header always wins.
pub async fn cookie_auth(mut request: Request<Body>, next: Next) -> Response {
    if !request.headers().contains_key(header::AUTHORIZATION) {
        if let Some(value) = cookie_value(request.headers(), AUTHORIZATION_COOKIE) {
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                request
                    .headers_mut()
                    .insert(header::AUTHORIZATION, header_value);
            }
        }
    }
    next.run(request).await
}

/// Enforces basic auth when credentials are configured.
pub async fn basic_auth(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.config.auth_enabled() {
        return next.run(request).await;
    }
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            credentials_match(
                value,
                state.config.username.as_deref().unwrap_or_default(),
                state.config.password.as_deref().unwrap_or_default(),
            )
        });
    if authorized {
        next.run(request).await
    } else {
        ApiError::unauthorized("invalid or missing credentials").into_response()
    }
}

/// CORS for browser clients: echo any concrete origin, allow credentials,
/// mirror the requested methods and headers on preflight.
///
/// Empty and wildcard origins are not echoable; the predicate rejects them
/// and the response simply carries no CORS headers.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            origin
                .to_str()
                .is_ok_and(|raw| !raw.is_empty() && raw != "*")
        }))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

fn credentials_match(header_value: &str, username: &str, password: &str) -> bool {
    let Some(encoded) = header_value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}

/// Extracts a cookie value from the request's `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_match() {
        let header = format!("Basic {}", BASE64.encode("receptor:secret"));
        assert!(credentials_match(&header, "receptor", "secret"));
        assert!(!credentials_match(&header, "receptor", "wrong"));
        assert!(!credentials_match("Bearer abc", "receptor", "secret"));
        assert!(!credentials_match("Basic !!!", "receptor", "secret"));
    }

    #[test]
    fn test_cookie_value_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("other=1; receptor_authorization=\"Basic abc\"; x=2"),
        );
        assert_eq!(
            cookie_value(&headers, AUTHORIZATION_COOKIE).as_deref(),
            Some("Basic abc")
        );
        assert_eq!(cookie_value(&headers, "missing"), None);
    }
}
