// Event streaming HTTP routes (SSE)
// Decision: Resume cursor comes from Last-Event-ID (browser reconnect) or lastSeq
//           (first connect after a page load); the header wins when both are set
// Decision: Heartbeats are SSE comments, so clients never see them as events

use axum::{
    extract::{FromRef, Query, State},
    http::HeaderMap,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use flowly_core::Event;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::{convert::Infallible, sync::Arc, time::Duration};
use utoipa::IntoParams;

use super::common::{api_error, ApiError, ListResponse};
use crate::auth::{AuthState, OptionalIdentity, StreamIdentity};
use crate::services::{EventBus, Frame, LiveStreamService};

const LAST_EVENT_ID: &str = "last-event-id";

/// Query parameters for the live stream
#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    /// Last sequence number the client has seen
    pub last_seq: Option<i64>,
    /// Bearer token for clients that cannot set headers (EventSource)
    #[serde(rename = "access_token")]
    pub access_token: Option<String>,
}

/// Query parameters for replay
#[derive(Debug, Deserialize, IntoParams)]
pub struct ReplayQuery {
    /// Return events with seq greater than this (default 0)
    pub since: Option<i64>,
}

// ============================================
// App State and Routes
// ============================================

/// App state for events routes
#[derive(Clone, FromRef)]
pub struct AppState {
    pub live_stream: LiveStreamService,
    pub bus: Arc<EventBus>,
    pub auth: AuthState,
    pub heartbeat: Duration,
}

impl AppState {
    pub fn new(
        live_stream: LiveStreamService,
        bus: Arc<EventBus>,
        auth: AuthState,
        heartbeat: Duration,
    ) -> Self {
        Self {
            live_stream,
            bus,
            auth,
            heartbeat,
        }
    }
}

/// Create event routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", get(stream_sse))
        .route("/v1/events/replay", get(replay_events))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// Resume cursor: Last-Event-ID header, else the lastSeq query parameter
fn resume_cursor(headers: &HeaderMap, query: &StreamQuery) -> Option<i64> {
    headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .or(query.last_seq)
}

/// Render one stream frame as SSE: `event: <type>`, `data: <Event JSON>`, `id: <seq>`
fn to_sse(frame: Frame) -> SseEvent {
    match frame {
        Frame::Event { event, id } => {
            let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
            let sse = SseEvent::default().event(&event.event_type).data(json);
            match id {
                Some(id) => sse.id(id.to_string()),
                None => sse,
            }
        }
        Frame::Error { message } => SseEvent::default()
            .event("error")
            .data(serde_json::json!({ "error": message }).to_string()),
    }
}

/// GET /v1/events - Live event stream (SSE)
#[utoipa::path(
    get,
    path = "/v1/events",
    params(
        StreamQuery,
        ("Last-Event-ID" = Option<i64>, Header, description = "Last sequence number seen; overrides lastSeq")
    ),
    responses(
        (status = 200, description = "Event stream", content_type = "text/event-stream"),
        (status = 400, description = "Malformed query")
    ),
    tag = "events"
)]
pub async fn stream_sse(
    State(state): State<AppState>,
    identity: StreamIdentity,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let cursor = resume_cursor(&headers, &query);
    let user_id = identity.user_id().map(str::to_string);

    tracing::info!(user_id = ?user_id, cursor = ?cursor, "Starting event stream");

    let stream = state
        .live_stream
        .connect(user_id, cursor)
        .map(|frame| Ok::<_, Infallible>(to_sse(frame)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.heartbeat)
            .text("heartbeat"),
    )
}

/// GET /v1/events/replay - Stored events after a cursor (JSON, polling fallback)
#[utoipa::path(
    get,
    path = "/v1/events/replay",
    params(ReplayQuery),
    responses(
        (status = 200, description = "Events visible to the caller, ascending by seq", body = ListResponse<Event>),
        (status = 500, description = "Internal server error")
    ),
    tag = "events"
)]
pub async fn replay_events(
    State(state): State<AppState>,
    identity: OptionalIdentity,
    Query(query): Query<ReplayQuery>,
) -> Result<Json<ListResponse<Event>>, ApiError> {
    let since = query.since.unwrap_or(0);
    let events = state
        .bus
        .events_since(since)
        .await
        .map_err(|e| api_error("replay events", e))?;

    let visible = events
        .into_iter()
        .filter(|event| event.is_visible_to(identity.user_id()))
        .collect();

    Ok(Json(ListResponse::new(visible)))
}
