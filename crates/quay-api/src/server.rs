//! HTTP server assembly.
//!
//! Builds the `/v1` router with its middleware stack and serves it with
//! graceful shutdown. Middleware order, outermost first: request logging,
//! CORS, cookie-auth, basic-auth, then the route table.

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use quay_runtime::{CallbackQueue, Hub, Shutdown};
use quay_store::Store;

use crate::config::Config;
use crate::middleware::{basic_auth, cookie_auth, cors_layer};
use crate::routes;

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// The cluster-state store client.
    pub store: Arc<dyn Store>,
    /// Fan-out hub backing `/v1/events`.
    pub hub: Hub,
    /// Enqueue handle for the callback worker pool.
    pub callbacks: CallbackQueue,
    /// Process-wide stop signal, observed by SSE streams.
    pub shutdown: Shutdown,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builds the public router for the given state.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .nest("/v1", routes::v1_routes())
        .with_state(Arc::clone(&state))
        .layer(from_fn_with_state(Arc::clone(&state), basic_auth))
        .layer(from_fn(cookie_auth));
    if state.config.cors_enabled {
        router = router.layer(cors_layer());
    }
    router.layer(TraceLayer::new_for_http())
}

/// Serves the public API until shutdown, then drains in-flight requests.
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound or the
/// connection loop fails.
pub async fn serve(state: Arc<AppState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(&state.config.address).await?;
    tracing::info!(address = %state.config.address, "API server listening");
    let router = create_router(Arc::clone(&state));
    let mut shutdown = state.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.triggered().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context as _, Result};
    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode, header};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use serde_json::{Value, json};
    use tower::ServiceExt as _;

    use quay_models::{
        ActualLRP, ActualLRPGroup, ActualLRPInstanceKey, ActualLRPKey, ActualLRPNetInfo,
        ActualLRPState, CellCapacity, CellPresence, TaskState,
    };
    use quay_runtime::shutdown_channel;
    use quay_runtime::{CallbackWorkerPool, ShutdownHandle, run_watcher};
    use quay_store::MemoryStore;

    struct Harness {
        router: Router,
        store: Arc<MemoryStore>,
        hub: Hub,
        // keeps every Shutdown receiver pending until the harness drops
        _shutdown_handle: ShutdownHandle,
    }

    fn harness_with_config(config: Config) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(config.event_buffer_size);
        let (shutdown_handle, shutdown) = shutdown_channel();
        let pool = CallbackWorkerPool::start(
            store.clone() as Arc<dyn Store>,
            &config.callback_config(),
            &shutdown,
        );
        let state = Arc::new(AppState {
            config,
            store: store.clone(),
            hub: hub.clone(),
            callbacks: pool.queue(),
            shutdown,
        });
        Harness {
            router: create_router(state),
            store,
            hub,
            _shutdown_handle: shutdown_handle,
        }
    }

    fn harness() -> Harness {
        harness_with_config(Config::default())
    }

    fn task_body(guid: &str) -> Value {
        json!({
            "task_guid": guid,
            "domain": "test-domain",
            "rootfs": "docker:///cloudfoundry/lucid64",
            "action": {"run": {"path": "/bin/true", "user": "vcap"}},
        })
    }

    fn lrp_body(guid: &str) -> Value {
        json!({
            "process_guid": guid,
            "domain": "test-domain",
            "rootfs": "docker:///cloudfoundry/lucid64",
            "instances": 2,
            "action": {"run": {"path": "/bin/server", "user": "vcap"}},
        })
    }

    async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
        router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router")
    }

    async fn send_json(
        router: &Router,
        method: Method,
        uri: &str,
        body: &Value,
    ) -> Response<Body> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        send(router, request).await
    }

    async fn get(router: &Router, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        send(router, request).await
    }

    async fn body_json(response: Response<Body>) -> Result<Value> {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await?;
        serde_json::from_slice(&bytes).context("decoding response body")
    }

    #[tokio::test]
    async fn test_create_and_get_task() -> Result<()> {
        let h = harness();
        let response = send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = get(&h.router, "/v1/tasks/t1").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["task_guid"], "t1");
        assert_eq!(body["state"], "PENDING");
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_task_guid_conflicts() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        let response = send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await?["name"], "TaskGuidAlreadyExists");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_task_lists_every_violation() -> Result<()> {
        let h = harness();
        let body = json!({
            "task_guid": "has space",
            "domain": "",
            "rootfs": "not a url",
            "action": {"run": {"path": "/bin/true", "user": "vcap"}},
        });
        let response = send_json(&h.router, Method::POST, "/v1/tasks", &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(body["name"], "InvalidTask");
        let message = body["message"].as_str().unwrap_or_default();
        assert!(message.contains("task_guid"));
        assert!(message.contains("domain"));
        assert!(message.contains("rootfs"));
        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_json() -> Result<()> {
        let h = harness();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/tasks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["name"], "InvalidJSON");
        Ok(())
    }

    #[tokio::test]
    async fn test_task_list_filters_by_domain() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        let mut other = task_body("t2");
        other["domain"] = json!("other-domain");
        send_json(&h.router, Method::POST, "/v1/tasks", &other).await;

        let body = body_json(get(&h.router, "/v1/tasks?domain=other-domain").await).await?;
        let listed = body.as_array().context("array body")?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["task_guid"], "t2");

        let body = body_json(get(&h.router, "/v1/tasks").await).await?;
        assert_eq!(body.as_array().context("array body")?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_completed_task_delete_removes_it() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        h.store.start_task("t1", "cell-1").await?;
        h.store.complete_task("t1", false, "", "out").await?;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/tasks/t1")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = get(&h.router, "/v1/tasks/t1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await?["name"], "TaskNotFound");
        Ok(())
    }

    #[tokio::test]
    async fn test_running_task_is_not_deletable() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        h.store.start_task("t1", "cell-1").await?;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/tasks/t1")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await?["name"], "TaskNotDeletable");
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_marks_task_completed() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/tasks", &task_body("t1")).await;
        let response = send_json(
            &h.router,
            Method::POST,
            "/v1/tasks/t1/cancel",
            &json!({}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let task = h.store.task_by_guid("t1").await?;
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.failed);
        assert_eq!(task.failure_reason, quay_models::task::TASK_CANCELLED_REASON);
        Ok(())
    }

    #[tokio::test]
    async fn test_desired_lrp_crud() -> Result<()> {
        let h = harness();
        let response =
            send_json(&h.router, Method::POST, "/v1/desired_lrps", &lrp_body("p1")).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response =
            send_json(&h.router, Method::POST, "/v1/desired_lrps", &lrp_body("p1")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await?["name"], "DesiredLRPAlreadyExists");

        let response = send_json(
            &h.router,
            Method::PUT,
            "/v1/desired_lrps/p1",
            &json!({"instances": 5}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let body = body_json(get(&h.router, "/v1/desired_lrps/p1").await).await?;
        assert_eq!(body["instances"], 5);
        assert_eq!(body["modification_tag"]["index"], 1);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/desired_lrps/p1")
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::NO_CONTENT);

        let response = get(&h.router, "/v1/desired_lrps/p1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await?["name"], "DesiredLRPNotFound");
        Ok(())
    }

    #[tokio::test]
    async fn test_desired_lrp_update_out_of_bounds_is_invalid() -> Result<()> {
        let h = harness();
        send_json(&h.router, Method::POST, "/v1/desired_lrps", &lrp_body("p1")).await;
        let oversized = "x".repeat(10_241);
        let response = send_json(
            &h.router,
            Method::PUT,
            "/v1/desired_lrps/p1",
            &json!({"annotation": oversized}),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["name"], "InvalidLRP");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_desired_lrp_reaches_sse_subscribers() -> Result<()> {
        let h = harness();
        let (handle, shutdown) = shutdown_channel();
        tokio::spawn(run_watcher(
            h.store.clone() as Arc<dyn Store>,
            h.hub.clone(),
            shutdown,
        ));
        tokio::task::yield_now().await;
        let mut source = h.hub.subscribe()?;

        send_json(&h.router, Method::POST, "/v1/desired_lrps", &lrp_body("p1")).await;

        let event =
            tokio::time::timeout(std::time::Duration::from_secs(2), source.next()).await??;
        assert_eq!(event.event_type(), "desired_lrp_created");
        assert_eq!(event.key(), "p1");
        handle.trigger();
        Ok(())
    }

    #[tokio::test]
    async fn test_event_stream_frames_and_headers() -> Result<()> {
        let h = harness();
        let response = get(&h.router, "/v1/events").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );

        let lrp = quay_models::DesiredLRP {
            process_guid: "p1".to_string(),
            domain: "test-domain".to_string(),
            rootfs: "docker:///lucid64".to_string(),
            ..quay_models::DesiredLRP::default()
        };
        h.hub.publish(&quay_models::Event::desired_lrp_created(lrp));
        h.hub.close();

        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await?;
        let text = String::from_utf8(bytes.to_vec())?;
        assert!(text.contains("id: 0"));
        assert!(text.contains("event: desired_lrp_created"));
        assert!(text.contains("\"process_guid\":\"p1\""));
        Ok(())
    }

    async fn evacuating_only_group(store: &MemoryStore) -> Result<()> {
        let key = ActualLRPKey::new("p1", 0, "test-domain");
        let mut lrp = ActualLRP::unclaimed(key, 0);
        lrp.state = ActualLRPState::Running;
        lrp.instance_key = ActualLRPInstanceKey::new("i1", "cell-1");
        lrp.net_info = ActualLRPNetInfo {
            address: "10.0.1.7".to_string(),
            ports: Vec::new(),
        };
        store
            .put_actual_lrp_group(ActualLRPGroup {
                instance: None,
                evacuating: Some(lrp),
            })
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_evacuating_only_group_resolves_flagged() -> Result<()> {
        let h = harness();
        evacuating_only_group(&h.store).await?;

        let response = get(&h.router, "/v1/actual_lrps/p1/index/0").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["evacuating"], true);
        assert_eq!(body["process_guid"], "p1");
        Ok(())
    }

    #[tokio::test]
    async fn test_actual_lrp_index_errors() -> Result<()> {
        let h = harness();
        let response = get(&h.router, "/v1/actual_lrps/p1/index/zero").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["name"], "InvalidRequest");

        let response = get(&h.router, "/v1/actual_lrps/p1/index/3").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await?["name"], "ActualLRPIndexNotFound");
        Ok(())
    }

    #[tokio::test]
    async fn test_retire_accepts_and_removes() -> Result<()> {
        let h = harness();
        evacuating_only_group(&h.store).await?;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/v1/actual_lrps/p1/index/0")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        Ok(())
    }

    #[tokio::test]
    async fn test_domain_upsert_and_listing() -> Result<()> {
        let h = harness();
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/v1/domains/fresh-domain")
            .header(header::CACHE_CONTROL, "max-age=100")
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::NO_CONTENT);

        let body = body_json(get(&h.router, "/v1/domains").await).await?;
        assert_eq!(body, json!(["fresh-domain"]));

        // no header means no expiry
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/v1/domains/forever")
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::NO_CONTENT);

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/v1/domains/bad")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await?["name"], "InvalidRequest");
        Ok(())
    }

    #[tokio::test]
    async fn test_cells_listing() -> Result<()> {
        let h = harness();
        h.store
            .put_cell(CellPresence {
                cell_id: "cell-1".to_string(),
                rep_address: "http://10.0.1.7:1800".to_string(),
                zone: "z1".to_string(),
                capacity: CellCapacity {
                    memory_mb: 4096,
                    disk_mb: 10_240,
                    containers: 256,
                },
                rootfs_providers: std::collections::BTreeMap::new(),
            })
            .await;

        let body = body_json(get(&h.router, "/v1/cells").await).await?;
        assert_eq!(body[0]["cell_id"], "cell-1");
        Ok(())
    }

    fn authed_config() -> Config {
        Config {
            username: Some("receptor".to_string()),
            password: Some("secret".to_string()),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_basic_auth_rejects_missing_and_wrong_credentials() -> Result<()> {
        let h = harness_with_config(authed_config());
        let response = get(&h.router, "/v1/tasks").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await?["name"], "Unauthorized");

        let request = Request::builder()
            .uri("/v1/tasks")
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64.encode("receptor:wrong")),
            )
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn test_basic_auth_accepts_configured_credentials() {
        let h = harness_with_config(authed_config());
        let request = Request::builder()
            .uri("/v1/tasks")
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64.encode("receptor:secret")),
            )
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cookie_carries_credentials() {
        let h = harness_with_config(authed_config());
        let cookie = format!(
            "receptor_authorization=\"Basic {}\"",
            BASE64.encode("receptor:secret")
        );
        let request = Request::builder()
            .uri("/v1/tasks")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .expect("request");
        assert_eq!(send(&h.router, request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auth_cookie_round_trip() {
        let h = harness();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth_cookie")
            .header(header::AUTHORIZATION, "Basic abc123")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.contains("receptor_authorization=\"Basic abc123\""));
        assert!(cookie.contains("HttpOnly"));

        // no Authorization header clears the cookie
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/auth_cookie")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_cors_preflight_echoes_concrete_origin() {
        let h = harness_with_config(Config {
            cors_enabled: true,
            ..Config::default()
        });
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/v1/tasks")
            .header(header::ORIGIN, "http://dashboard.example.com")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .expect("request");
        let response = send(&h.router, request).await;
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|value| value.to_str().ok()),
            Some("http://dashboard.example.com")
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-credentials")
                .and_then(|value| value.to_str().ok()),
            Some("true")
        );
    }
}
