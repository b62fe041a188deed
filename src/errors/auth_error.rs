use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::handlers::response::ApiResponse;

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeader,

    #[error("invalid token")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Auth configuration error: {0}")]
    ConfigError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired
            | AuthError::InvalidCredentials(_) => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            AuthError::InvalidToken(reason) => {
                tracing::debug!(reason = %reason, "Rejected token");
            }
            AuthError::ConfigError(reason) => {
                tracing::error!(reason = %reason, "Auth configuration error");
            }
            _ => {}
        }
        ApiResponse::<()>::new(status, self.to_string(), None).into_response()
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::MissingAuthHeader.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::ConfigError("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_token_hides_reason() {
        let err = AuthError::InvalidToken("signature mismatch".to_string());
        assert_eq!(err.to_string(), "invalid token");
    }

    #[test]
    fn test_into_response_status() {
        let response = AuthError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
