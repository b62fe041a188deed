use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, assistant, auth, history, tts, user};
use crate::state::AppState;
use std::sync::Arc;

/// Routes reachable without an access token.
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify-otp", post(auth::verify_otp))
        .layer(TraceLayer::new_for_http())
}

/// Routes that require a valid access token.
///
/// Authentication middleware is applied by the caller once state is available.
pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/refresh-token", post(auth::refresh_token))
        .route("/api/auth/auth-me", get(auth::auth_me))
        .route("/api/user/update-settings", put(user::update_settings))
        .route("/api/user/get-settings", get(user::get_settings))
        .route("/history", post(history::save_history))
        .route("/history/{user_id}", get(history::get_user_history))
        .route("/user-conversations", get(history::get_user_conversations))
        .route(
            "/conversation-messages",
            get(history::get_conversation_messages),
        )
        .route("/save-messages", post(history::save_messages))
        .route("/chat", post(assistant::chat))
        .route("/translate", post(assistant::translate))
        .route("/transcribe", post(assistant::transcribe))
        .route("/text-chat", post(assistant::text_chat))
        .route("/tts", post(tts::text_to_speech))
        .route("/tts-api", post(tts::text_to_speech_upload))
        .layer(TraceLayer::new_for_http())
}
