use axum::{Json, response::IntoResponse};
use serde_json::json;

/// `GET /`
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}
