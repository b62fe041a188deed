pub mod api;
pub mod realtime;

use axum::{Router, middleware};
use std::sync::Arc;

use crate::middleware::{auth_middleware, connection_limit_middleware, stream_auth_middleware};
use crate::state::AppState;

/// The complete application router with authentication and connection
/// limits in place. Transport layers (CORS, rate limiting, security headers)
/// are added by the binary.
///
/// Streaming routes read the peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let protected = api::create_protected_router().layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    // Outer to inner: connection_limit -> stream auth -> handler.
    // A rejected upgrade gives its slot back in connection_limit.
    let streaming = realtime::create_realtime_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            stream_auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            connection_limit_middleware,
        ));

    Router::new()
        .merge(api::create_public_router())
        .merge(protected)
        .merge(streaming)
        .with_state(state)
}
