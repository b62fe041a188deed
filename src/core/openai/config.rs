//! OpenAI REST settings for the one-shot calls.

use zeroize::Zeroize;

/// Model answering chat turns.
pub const CHAT_MODEL: &str = "gpt-4-0613";

/// Model used for translation.
pub const TRANSLATE_MODEL: &str = "gpt-3.5-turbo-1106";

/// Sampling temperature for generated titles.
pub const TITLE_TEMPERATURE: f32 = 0.5;

pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

pub const SPEECH_MODEL: &str = "tts-1";

pub const SPEECH_VOICE: &str = "nova";

#[derive(Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    /// e.g. `https://api.openai.com/v1`, without trailing slash
    pub base_url: String,
    pub chat_model: String,
    pub translate_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub speech_voice: String,
}

impl OpenAIConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_model: CHAT_MODEL.to_string(),
            translate_model: TRANSLATE_MODEL.to_string(),
            transcription_model: TRANSCRIPTION_MODEL.to_string(),
            speech_model: SPEECH_MODEL.to_string(),
            speech_voice: SPEECH_VOICE.to_string(),
        }
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub fn transcriptions_url(&self) -> String {
        format!("{}/audio/transcriptions", self.base_url)
    }

    pub fn speech_url(&self) -> String {
        format!("{}/audio/speech", self.base_url)
    }
}

impl std::fmt::Debug for OpenAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("translate_model", &self.translate_model)
            .finish_non_exhaustive()
    }
}

impl Drop for OpenAIConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
