//! Streaming routes.
//!
//! `GET /ws/openai` upgrades to a WebSocket relayed to the OpenAI Realtime
//! API. Frames travel opaquely in both directions: text frames carry the
//! provider's JSON events, binary frames carry audio. The provider
//! credential never leaves the server.
//!
//! `GET /ws/echo` and `GET /ws/text` are diagnostic sockets. `GET /ws/audio`
//! writes incoming binary frames to a capture file.

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_relay_handler;
use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Stream authentication and connection limits are applied by the caller.
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/openai", get(realtime_relay_handler))
        .route("/ws/echo", get(ws::echo_handler))
        .route("/ws/text", get(ws::text_handler))
        .route("/ws/audio", get(ws::audio_capture_handler))
        .layer(TraceLayer::new_for_http())
}
