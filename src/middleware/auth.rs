use crate::auth::Auth;
use crate::errors::auth_error::AuthError;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Extract the bearer token from a request.
///
/// 1. `Authorization: Bearer <token>` (preferred)
/// 2. `?token=<token>` query parameter, for browser WebSocket clients that
///    cannot set headers
fn extract_token(request: &Request) -> Result<String, AuthError> {
    if let Some(auth_header) = request.headers().get("authorization") {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;

        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            tracing::debug!("Token extracted from Authorization header");
            return Ok(token.trim().to_string());
        }
        return Err(AuthError::InvalidAuthHeader);
    }

    if let Some(query) = request.uri().query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if key == "token" {
                tracing::debug!("Token extracted from query parameter");
                return Ok(value.into_owned());
            }
        }
    }

    Err(AuthError::MissingAuthHeader)
}

async fn authenticate(state: &AppState, request: &mut Request) -> Result<(), AuthError> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let token = extract_token(request)?;
    match state.auth.authenticate(&token).await {
        Ok(user) => {
            tracing::debug!(%method, %path, auth_id = %user.id, "Authenticated request");
            request.extensions_mut().insert(Auth::for_user(user.id));
            Ok(())
        }
        Err(e) => {
            tracing::warn!(%method, %path, error = %e, "Authentication failed");
            Err(e)
        }
    }
}

/// Protects REST routes: a valid access token for an existing user is
/// always required.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    authenticate(&state, &mut request).await?;
    Ok(next.run(request).await)
}

/// Protects streaming routes. Enforced only when `auth_required` is set;
/// otherwise requests proceed with an anonymous [`Auth`].
pub async fn stream_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !state.config.auth_required {
        tracing::debug!("Stream authentication disabled, inserting anonymous Auth");
        request.extensions_mut().insert(Auth::anonymous());
        return Ok(next.run(request).await);
    }

    authenticate(&state, &mut request).await?;
    Ok(next.run(request).await)
}
