use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::jwt::JwtCodec;
use super::otp::{generate_otp, otp_expiry, otp_matches};
use super::password::{MIN_PASSWORD_LEN, hash_password, verify_password};
use crate::core::email::EmailSender;
use crate::errors::app_error::{AppError, AppResult};
use crate::errors::auth_error::{AuthError, AuthResult};
use crate::store::{NewUser, User, UserStore};

const OTP_SUBJECT: &str = "Your login code";

/// Returned by a successful password check; the code goes out by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginChallenge {
    pub user_id: Uuid,
    pub otp_expires_in_minutes: u64,
}

/// Signup, two-step login and token handling.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    email: Arc<dyn EmailSender>,
    jwt: JwtCodec,
    otp_lifetime_minutes: u64,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        email: Arc<dyn EmailSender>,
        jwt: JwtCodec,
        otp_lifetime_minutes: u64,
    ) -> Self {
        Self {
            users,
            email,
            jwt,
            otp_lifetime_minutes,
        }
    }

    pub fn jwt(&self) -> &JwtCodec {
        &self.jwt
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> AppResult<User> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if self.users.find_by_email(email).await?.is_some() {
            return Err(crate::store::StoreError::DuplicateEmail.into());
        }

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(format!("password hashing task failed: {e}")))??;

        let user = self
            .users
            .insert(NewUser {
                email: email.to_string(),
                name: name.to_string(),
                password_hash,
            })
            .await?;
        info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Check the password, store a fresh one-time code and email it.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginChallenge> {
        let invalid = || AppError::from(AuthError::InvalidCredentials("Invalid credentials".into()));

        let Some(mut user) = self.users.find_by_email(email).await? else {
            return Err(invalid());
        };

        let submitted = password.to_string();
        let stored = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&submitted, &stored))
            .await
            .map_err(|e| AppError::Internal(format!("password check task failed: {e}")))?;
        if !valid {
            warn!(user_id = %user.id, "Login rejected: wrong password");
            return Err(invalid());
        }

        let code = generate_otp();
        user.otp_code = Some(code.clone());
        user.otp_expires_at = Some(otp_expiry(
            OffsetDateTime::now_utc(),
            self.otp_lifetime_minutes,
        ));
        let user = self.users.update(user).await?;

        let body = format!(
            "Your login code is {code}. It expires in {} minutes.",
            self.otp_lifetime_minutes
        );
        self.email.send_text(&user.email, OTP_SUBJECT, &body).await?;

        info!(user_id = %user.id, "Login code issued");
        Ok(LoginChallenge {
            user_id: user.id,
            otp_expires_in_minutes: self.otp_lifetime_minutes,
        })
    }

    /// Exchange a valid, unexpired code for an access token. Codes are single use.
    pub async fn verify_otp(&self, user_id: Uuid, otp: &str) -> AppResult<String> {
        let invalid =
            || AppError::from(AuthError::InvalidCredentials("OTP is invalid or expired.".into()));

        let Some(mut user) = self.users.find_by_id(user_id).await? else {
            return Err(invalid());
        };

        let valid = match (&user.otp_code, user.otp_expires_at) {
            (Some(code), Some(expires_at)) => {
                expires_at > OffsetDateTime::now_utc() && otp_matches(code, otp)
            }
            _ => false,
        };
        if !valid {
            return Err(invalid());
        }

        user.otp_code = None;
        user.otp_expires_at = None;
        let user = self.users.update(user).await?;

        info!(user_id = %user.id, "Login completed");
        Ok(self.jwt.issue(user.id)?)
    }

    pub fn issue_token(&self, user_id: Uuid) -> AuthResult<String> {
        self.jwt.issue(user_id)
    }

    /// Resolve a bearer token to a stored user.
    pub async fn authenticate(&self, token: &str) -> AuthResult<User> {
        let user_id = self.jwt.user_id(token)?;
        self.current_user(user_id).await
    }

    pub async fn current_user(&self, user_id: Uuid) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await
            .map_err(|e| AuthError::ConfigError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)
    }
}
