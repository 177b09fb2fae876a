//! HTTP route handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use futures_util::stream::{self, Stream};
use serde_json::json;

use crate::broadcast::Subscription;
use crate::web::AppState;

/// Turn a subscription into SSE frames. Dropping the stream unsubscribes.
fn event_stream(subscription: Subscription) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |mut sub| async move {
        let payload = sub.recv().await?;
        let event = Event::default().data(String::from_utf8_lossy(&payload));
        Some((Ok(event), sub))
    })
}

/// GET /events: live change stream, future changes only.
pub async fn events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscription = state.hub.subscribe();
    tracing::debug!(
        subscriber = subscription.id(),
        subscribers = state.hub.subscriber_count(),
        "event stream opened"
    );

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(event_stream(subscription)).keep_alive(KeepAlive::default()),
    )
}

/// GET /api/lines: tracked line designations and routed lines.
pub async fn api_lines(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "designations": state.catalog.designations(),
        "groups": state.catalog.groups(),
        "lines": state.catalog.lines(),
    }))
}

/// GET /healthz: liveness plus current subscriber count.
pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "subscribers": state.hub.subscriber_count(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
