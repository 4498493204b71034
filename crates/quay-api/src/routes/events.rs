//! The SSE event stream.
//!
//! - `GET /v1/events` - Stream change events as Server-Sent Events
//!
//! Each frame carries a per-subscription monotonic `id` starting at 0,
//! the event type in `event:`, and the JSON body in `data:`. The stream
//! ends on client disconnect, hub close, slow-consumer eviction, an
//! unencodable event, or process shutdown; each of those closes only this
//! subscription.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream;

use quay_runtime::{EventSource, Shutdown};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Event stream route table.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(stream_events))
}

async fn stream_events(State(state): State<Arc<AppState>>) -> ApiResult<Response> {
    let source = state
        .hub
        .subscribe()
        .map_err(|err| ApiError::unknown(err.to_string()))?;
    let shutdown = state.shutdown.clone();

    let frames = stream::unfold(
        StreamState {
            source,
            shutdown,
            next_id: 0,
        },
        |mut stream| async move {
            let frame = next_frame(&mut stream).await?;
            Some((Ok::<SseEvent, Infallible>(frame), stream))
        },
    );

    let mut response = Sse::new(frames).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

struct StreamState {
    source: EventSource,
    shutdown: Shutdown,
    next_id: u64,
}

async fn next_frame(stream: &mut StreamState) -> Option<SseEvent> {
    let event = tokio::select! {
        () = stream.shutdown.triggered() => return None,
        received = stream.source.next() => received.ok()?,
    };
    // a malformed event ends this stream, not the hub
    let data = serde_json::to_string(&event).ok()?;
    let frame = SseEvent::default()
        .id(stream.next_id.to_string())
        .event(event.event_type())
        .data(data);
    stream.next_id += 1;
    Some(frame)
}
