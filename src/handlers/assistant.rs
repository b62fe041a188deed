//! One-shot assistant calls: chat, translation, transcription and the
//! combined text chat that also returns translated text and speech.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::response::{ApiJson, ApiResponse};
use crate::core::providers::ChatTurn;
use crate::core::storage::StorageError;
use crate::errors::app_error::{AppError, AppResult};
use crate::state::AppState;
use crate::store::{DEFAULT_PREFERRED_LANGUAGE, Role};

fn default_language() -> String {
    DEFAULT_PREFERRED_LANGUAGE.to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_language: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateReply {
    pub translated_text: String,
}

#[derive(Debug, Serialize)]
pub struct TranscribeReply {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextChatReply {
    pub role: Role,
    pub content: String,
    pub translated_content: String,
    pub audio_url: String,
}

/// `POST /chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> AppResult<ApiResponse<ChatReply>> {
    let reply = state
        .language_model
        .chat(&request.history, &request.message)
        .await?;
    Ok(ApiResponse::success(ChatReply { reply }))
}

/// `POST /translate`
pub async fn translate(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TranslateRequest>,
) -> AppResult<ApiResponse<TranslateReply>> {
    if request.target_language.trim().is_empty() {
        return Err(AppError::Validation(
            "target_language must not be empty".to_string(),
        ));
    }
    let translated_text = state
        .language_model
        .translate(&request.text, &request.target_language)
        .await?;
    Ok(ApiResponse::success(TranslateReply { translated_text }))
}

/// `POST /transcribe` with the audio in multipart field `file`.
pub async fn transcribe(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<ApiResponse<TranscribeReply>> {
    let mut multipart = multipart.map_err(|e| AppError::Validation(e.body_text()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("audio.webm").to_string();
        let audio = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        if audio.is_empty() {
            return Err(AppError::Validation("file is empty".to_string()));
        }

        let text = state.transcriber.transcribe(audio, &file_name).await?;
        return Ok(ApiResponse::success(TranscribeReply { text }));
    }

    Err(AppError::Validation("missing multipart field `file`".to_string()))
}

/// `POST /text-chat`: reply, translate it into `language`, synthesize and
/// upload the speech.
pub async fn text_chat(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> AppResult<ApiResponse<TextChatReply>> {
    let uploader = state
        .uploader
        .clone()
        .ok_or(AppError::Storage(StorageError::NotConfigured))?;
    let started = Instant::now();

    let reply = state
        .language_model
        .chat(&request.history, &request.message)
        .await?;
    info!(elapsed_ms = started.elapsed().as_millis() as u64, "Chat reply received");

    let translate = async {
        state
            .language_model
            .translate(&reply, &request.language)
            .await
            .map_err(AppError::from)
    };
    let speak = async {
        let audio = state.speech.synthesize(&reply).await?;
        let url = uploader
            .upload_audio(&format!("{}.mp3", Uuid::new_v4()), audio)
            .await?;
        Ok::<_, AppError>(url)
    };
    let (translated_content, audio_url) = tokio::try_join!(translate, speak)?;

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Text chat completed"
    );
    Ok(ApiResponse::success(TextChatReply {
        role: Role::Assistant,
        content: reply,
        translated_content,
        audio_url,
    }))
}
