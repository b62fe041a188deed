//! JSON response envelope shared by every REST endpoint.
//!
//! ```json
//! { "status": 200, "message": "success", "data": { ... } }
//! ```

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::errors::app_error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: u16,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: status.as_u16(),
            message: Some(message.into()),
            data,
        }
    }

    /// `200 success` carrying `data`.
    pub fn success(data: T) -> Self {
        Self::new(StatusCode::OK, "success", Some(data))
    }
}

impl ApiResponse<()> {
    /// `200 success` with `data: null`.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK, "success", None)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// `Json<T>` whose rejection renders through [`AppError`], so malformed
/// bodies get the same envelope as every other error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| AppError::Validation(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}
