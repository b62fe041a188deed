//! One-shot AI provider capabilities.
//!
//! Each trait is a single request/response call. Handlers depend on these
//! traits only, so tests substitute scripted implementations.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Provider API key is not configured")]
    MissingApiKey,

    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

// =============================================================================
// Capabilities
// =============================================================================

/// One prior turn of a chat, as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Text generation.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Reply to `message` given the prior `history`.
    async fn chat(&self, history: &[ChatTurn], message: &str) -> ProviderResult<String>;

    /// Translate `text` into `target_language`.
    async fn translate(&self, text: &str, target_language: &str) -> ProviderResult<String>;

    /// Short title (10 to 20 characters) summarising `texts`, written in `language`.
    async fn generate_title(&self, texts: &[String], language: &str) -> ProviderResult<String>;
}

/// Speech to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> ProviderResult<String>;
}

/// Text to speech. Returns MP3 audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> ProviderResult<Bytes>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Api {
            status: 429,
            message: "Rate limit reached".to_string(),
        };
        assert_eq!(err.to_string(), "Provider API error (429): Rate limit reached");
        assert_eq!(
            ProviderError::MissingApiKey.to_string(),
            "Provider API key is not configured"
        );
    }

    #[test]
    fn test_chat_turn_deserializes_from_client_history() {
        let turns: Vec<ChatTurn> =
            serde_json::from_str(r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#)
                .unwrap();
        assert_eq!(turns[1], ChatTurn::new("assistant", "hello"));
    }
}
