//! `/api/auth/*`: signup, two-step login and token refresh.

use std::sync::Arc;

use axum::extract::State;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::response::{ApiJson, ApiResponse};
use crate::auth::{AuthUser, LoginChallenge, TOKEN_TYPE};
use crate::errors::app_error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub user_id: Uuid,
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: TOKEN_TYPE,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> AppResult<ApiResponse<()>> {
    state
        .auth
        .signup(&request.name, &request.email, &request.password)
        .await?;
    Ok(ApiResponse::ok())
}

/// Checks the password and emails a one-time code.
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<ApiResponse<LoginChallenge>> {
    let challenge = state.auth.login(&request.email, &request.password).await?;
    Ok(ApiResponse::success(challenge))
}

pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<VerifyOtpRequest>,
) -> AppResult<ApiResponse<TokenResponse>> {
    let token = state.auth.verify_otp(request.user_id, &request.otp).await?;
    Ok(ApiResponse::success(TokenResponse::bearer(token)))
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<ApiResponse<TokenResponse>> {
    let token = state.auth.issue_token(user_id)?;
    Ok(ApiResponse::success(TokenResponse::bearer(token)))
}

pub async fn auth_me(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
) -> AppResult<ApiResponse<MeResponse>> {
    let user = state.auth.current_user(user_id).await?;
    Ok(ApiResponse::success(MeResponse {
        id: user.id,
        email: user.email,
        created_at: user.created_at,
    }))
}
