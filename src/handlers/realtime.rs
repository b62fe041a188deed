//! `/ws/openai`: relays a client WebSocket to the OpenAI Realtime API.
//!
//! Each accepted connection becomes one [`RelaySession`]. Payloads are
//! forwarded opaquely in both directions until either side ends.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::StreamExt;
use futures::stream::{SplitSink, SplitStream};
use tracing::{info, warn};

use crate::auth::Auth;
use crate::core::relay::{Frame, RelaySession, Side, SocketEndpoint, Wire, WireMessage};
use crate::middleware::ConnectionSlot;
use crate::state::AppState;

/// Client-facing endpoint of a relay session.
pub type InboundEndpoint =
    SocketEndpoint<SplitSink<WebSocket, Message>, SplitStream<WebSocket>, Message>;

impl WireMessage for Message {
    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Message::Binary(data),
            Frame::Text(text) => Message::Text(text.into()),
        }
    }

    fn into_wire(self) -> Wire {
        match self {
            Message::Binary(data) => Wire::Data(Frame::Binary(data)),
            Message::Text(text) => Wire::Data(Frame::Text(text.as_str().to_owned())),
            Message::Ping(_) | Message::Pong(_) => Wire::Control,
            Message::Close(_) => Wire::Close,
        }
    }

    fn close_frame() -> Self {
        Message::Close(None)
    }
}

/// Upgrade the connection and run a relay session on it.
///
/// Frames larger than `max_message_bytes` are refused by the socket itself,
/// which ends the session with a receive failure on the client side.
pub async fn realtime_relay_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    auth: Option<Extension<Auth>>,
    slot: Option<Extension<ConnectionSlot>>,
) -> Response {
    let auth = auth.map(|Extension(auth)| auth).unwrap_or_default();
    let slot = slot.map(|Extension(slot)| slot);
    info!(auth_id = ?auth.user_id, "Realtime relay upgrade requested");

    let max_message_bytes = state.config.relay.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .max_frame_size(max_message_bytes)
        .on_upgrade(move |socket| serve_relay(socket, state, auth, slot))
}

async fn serve_relay(
    socket: WebSocket,
    state: Arc<AppState>,
    auth: Auth,
    slot: Option<ConnectionSlot>,
) {
    let limits = state.config.relay_limits();
    let (sink, stream) = socket.split();
    let inbound: InboundEndpoint =
        SocketEndpoint::new(Side::Inbound, sink, stream, limits.close_timeout);

    let session = RelaySession::new(Arc::new(inbound), limits, &state.shutdown);
    info!(session_id = %session.id(), auth_id = ?auth.user_id, "Client connected to realtime relay");

    let report = session.serve(state.connector.as_ref()).await;
    if !report.cause.is_graceful() {
        warn!(session_id = %report.id, cause = %report.cause, "Realtime relay ended abnormally");
    }
    drop(slot);
}
