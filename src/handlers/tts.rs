//! Text to speech, streamed back or uploaded.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::response::{ApiJson, ApiResponse};
use crate::core::storage::{AUDIO_CONTENT_TYPE, StorageError};
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::DEFAULT_PREFERRED_LANGUAGE;

fn default_language() -> String {
    DEFAULT_PREFERRED_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    /// Logged with each request; the synthesizer detects the language itself.
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct TtsUploaded {
    pub audio_url: String,
}

fn validate(request: &TtsRequest) -> AppResult<()> {
    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text must not be empty".to_string()));
    }
    Ok(())
}

/// `POST /tts`: MP3 audio in the response body.
pub async fn text_to_speech(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TtsRequest>,
) -> AppResult<Response> {
    validate(&request)?;
    debug!(language = %request.language, chars = request.text.len(), "Synthesizing speech");

    let audio = state.speech.synthesize(&request.text).await?;
    Ok(([(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)], audio).into_response())
}

/// `POST /tts-api`: synthesize, upload, return the public URL.
pub async fn text_to_speech_upload(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TtsRequest>,
) -> AppResult<ApiResponse<TtsUploaded>> {
    validate(&request)?;
    let uploader = state
        .uploader
        .clone()
        .ok_or(AppError::Storage(StorageError::NotConfigured))?;
    debug!(language = %request.language, chars = request.text.len(), "Synthesizing speech for upload");

    let audio = state.speech.synthesize(&request.text).await?;
    let audio_url = uploader
        .upload_audio(&format!("{}.mp3", Uuid::new_v4()), audio)
        .await?;
    Ok(ApiResponse::success(TtsUploaded { audio_url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_defaults_and_is_kept() {
        let request: TtsRequest = serde_json::from_str(r#"{"text":"hola"}"#).unwrap();
        assert_eq!(request.language, DEFAULT_PREFERRED_LANGUAGE);

        let request: TtsRequest =
            serde_json::from_str(r#"{"text":"hola","language":"es"}"#).unwrap();
        assert_eq!(request.language, "es");
        assert!(validate(&request).is_ok());
    }
}
