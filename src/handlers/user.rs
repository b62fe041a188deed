//! `/api/user/*`: per-user settings.

use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::response::{ApiJson, ApiResponse};
use crate::auth::AuthUser;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::User;

#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdateRequest {
    pub name: Option<String>,
    pub preferred_language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub name: String,
    pub preferred_language: String,
}

impl From<&User> for SettingsResponse {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            preferred_language: user.preferred_language.clone(),
        }
    }
}

async fn load_user(state: &AppState, user_id: uuid::Uuid) -> AppResult<User> {
    state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    ApiJson(update): ApiJson<SettingsUpdateRequest>,
) -> AppResult<ApiResponse<()>> {
    let mut user = load_user(&state, user_id).await?;

    if let Some(name) = update.name {
        user.name = name;
    }
    if let Some(language) = update.preferred_language {
        let language = language.trim();
        if language.is_empty() {
            return Err(AppError::Validation(
                "preferred_language must not be empty".to_string(),
            ));
        }
        user.preferred_language = language.to_string();
    }

    state.users.update(user).await?;
    Ok(ApiResponse::ok())
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<ApiResponse<SettingsResponse>> {
    let user = load_user(&state, user_id).await?;
    Ok(ApiResponse::success(SettingsResponse::from(&user)))
}
