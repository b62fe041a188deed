//! HS256 access tokens.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::errors::auth_error::{AuthError, AuthResult};

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_seconds: i64,
}

impl JwtCodec {
    pub fn new(secret: &str, lifetime_minutes: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_seconds: i64::try_from(lifetime_minutes.saturating_mul(60)).unwrap_or(i64::MAX),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> AuthResult<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> AuthResult<String> {
        let iat = now.unix_timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat.saturating_add(self.lifetime_seconds),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::ConfigError(format!("Failed to sign token: {e}")))
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }

    /// Verify `token` and return the user id it was issued for.
    pub fn user_id(&self, token: &str) -> AuthResult<Uuid> {
        let claims = self.verify(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|e| AuthError::InvalidToken(format!("subject is not a user id: {e}")))
    }
}
