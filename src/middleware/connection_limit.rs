//! Caps on concurrent streaming connections, globally and per client IP.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/ws/openai", get(realtime_relay_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         connection_limit_middleware,
//!     ));
//! ```

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::handlers::response::ApiResponse;
use crate::state::{AppState, ConnectionLimitError};

/// A reserved streaming connection slot.
///
/// Inserted into the request extensions of every admitted upgrade. Handlers
/// move it into their `on_upgrade` callback; the slot is released when the
/// last clone drops, so a rejected request, an upgrade that never completes
/// and a finished session all give it back.
#[derive(Clone)]
pub struct ConnectionSlot(Arc<SlotGuard>);

struct SlotGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl ConnectionSlot {
    fn new(state: Arc<AppState>, ip: IpAddr) -> Self {
        Self(Arc::new(SlotGuard { state, ip }))
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
        tracing::debug!(ip = %self.ip, "Released streaming connection slot");
    }
}

impl fmt::Debug for ConnectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionSlot").field(&self.0.ip).finish()
    }
}

/// Admits WebSocket upgrades while slots are available.
///
/// Returns 503 when the global limit is reached and 429 when the per-IP limit
/// is reached. Other requests pass through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();
    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request
                .extensions_mut()
                .insert(ConnectionSlot::new(state.clone(), client_ip));
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(ip = %client_ip, reason = %err, "Rejecting streaming connection");
            let (status, message) = match err {
                ConnectionLimitError::GlobalLimitReached => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Server at capacity. Please try again later.",
                ),
                ConnectionLimitError::PerIpLimitReached => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many connections from your IP address.",
                ),
            };
            ApiResponse::<()>::new(status, message, None).into_response()
        }
    }
}
