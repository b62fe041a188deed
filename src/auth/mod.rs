//! Accounts, one-time codes and access tokens.

pub mod jwt;
pub mod otp;
pub mod password;
pub mod service;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::errors::auth_error::AuthError;

pub use jwt::{Claims, JwtCodec, TOKEN_TYPE};
pub use service::{AuthService, LoginChallenge};

/// Authentication context inserted into request extensions by the auth
/// middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auth {
    pub user_id: Option<Uuid>,
}

impl Auth {
    /// Request let through without credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Extracts the authenticated user id, rejecting anonymous requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Auth>()
            .and_then(|auth| auth.user_id)
            .map(AuthUser)
            .ok_or(AuthError::MissingAuthHeader)
    }
}
