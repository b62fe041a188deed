//! OpenAI REST client for chat, translation, titles, transcription and speech.
//!
//! A single `reqwest::Client` is reused across requests for connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::config::{OpenAIConfig, TITLE_TEMPERATURE};
use super::messages::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OpenAIErrorResponse,
    SpeechRequest, TranscriptionResponse,
};
use crate::core::providers::{
    ChatTurn, LanguageModel, ProviderError, ProviderResult, SpeechSynthesizer, Transcriber,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAIClient {
    config: OpenAIConfig,
    http_client: Client,
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> ProviderResult<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ProviderError::Request(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn bearer(&self) -> ProviderResult<String> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        Ok(format!("Bearer {}", self.config.api_key))
    }

    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatMessage<'_>>,
        temperature: Option<f32>,
    ) -> ProviderResult<String> {
        let request = ChatCompletionRequest {
            model,
            messages,
            temperature,
        };

        let response = self
            .http_client
            .post(self.config.chat_completions_url())
            .header("Authorization", self.bearer()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("Request failed: {e}")))?;

        let completion: ChatCompletionResponse = read_json(response).await?;
        completion
            .first_content()
            .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".to_string()))
    }
}

/// Read the body and decode it, turning non-2xx statuses into [`ProviderError::Api`].
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::Request(format!("Failed to read response: {e}")))?;

    if !status.is_success() {
        return Err(api_error(status.as_u16(), &text));
    }

    serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
}

fn api_error(status: u16, body: &str) -> ProviderError {
    let message = match serde_json::from_str::<OpenAIErrorResponse>(body) {
        Ok(parsed) => match parsed.error.error_type {
            Some(kind) => format!("{} ({kind})", parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body.to_string(),
    };
    ProviderError::Api { status, message }
}

fn title_prompt(texts: &[String], language: &str) -> String {
    format!(
        "There are conversations with AI below.\n\
         Summarize these conversations then make title with {language} and 10 to 20 characters.\n\n\
         Conversations:\n{}",
        texts.join("\n")
    )
}

fn translate_prompt(text: &str, target_language: &str) -> String {
    format!("translate below sentences to {target_language}. \n\n{text}")
}

fn audio_mime(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") | Some("mpeg") | Some("mpga") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/webm",
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn chat(&self, history: &[ChatTurn], message: &str) -> ProviderResult<String> {
        let mut messages: Vec<ChatMessage<'_>> = history
            .iter()
            .map(|turn| ChatMessage {
                role: &turn.role,
                content: &turn.content,
            })
            .collect();
        messages.push(ChatMessage {
            role: "user",
            content: message,
        });

        debug!(turns = history.len(), "Requesting chat completion");
        self.complete(&self.config.chat_model, messages, None).await
    }

    async fn translate(&self, text: &str, target_language: &str) -> ProviderResult<String> {
        let prompt = translate_prompt(text, target_language);
        self.complete(
            &self.config.translate_model,
            vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            None,
        )
        .await
    }

    async fn generate_title(&self, texts: &[String], language: &str) -> ProviderResult<String> {
        let prompt = title_prompt(texts, language);
        let title = self
            .complete(
                &self.config.chat_model,
                vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
                Some(TITLE_TEMPERATURE),
            )
            .await?;
        Ok(title.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for OpenAIClient {
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> ProviderResult<String> {
        info!(bytes = audio.len(), file_name, "Sending audio for transcription");

        let file_part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str(audio_mime(file_name))
            .map_err(|e| ProviderError::Request(format!("Invalid MIME type: {e}")))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.config.transcription_model.clone());

        let response = self
            .http_client
            .post(self.config.transcriptions_url())
            .header("Authorization", self.bearer()?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("Request failed: {e}")))?;

        let transcription: TranscriptionResponse = read_json(response).await?;
        Ok(transcription.text)
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAIClient {
    async fn synthesize(&self, text: &str) -> ProviderResult<Bytes> {
        let request = SpeechRequest {
            model: &self.config.speech_model,
            voice: &self.config.speech_voice,
            input: text,
        };

        let response = self
            .http_client
            .post(self.config.speech_url())
            .header("Authorization", self.bearer()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), &body));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Request(format!("Failed to read audio: {e}")))?;
        info!(bytes = audio.len(), "Speech synthesized");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OpenAIClient {
        OpenAIClient::new(OpenAIConfig::new("sk-test", server.uri())).unwrap()
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({"choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn test_chat_appends_user_message_to_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4-0613",
                "messages": [
                    {"role": "assistant", "content": "Hello"},
                    {"role": "user", "content": "How are you?"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Fine")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let reply = client
            .chat(&[ChatTurn::new("assistant", "Hello")], "How are you?")
            .await
            .unwrap();
        assert_eq!(reply, "Fine");
    }

    #[tokio::test]
    async fn test_translate_uses_translation_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": "gpt-3.5-turbo-1106"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("こんにちは")))
            .mount(&server)
            .await;

        let translated = client_for(&server).translate("Hello", "ja").await.unwrap();
        assert_eq!(translated, "こんにちは");
    }

    #[tokio::test]
    async fn test_generate_title_is_trimmed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"temperature": 0.5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  旅行の計画  \n")))
            .mount(&server)
            .await;

        let title = client_for(&server)
            .generate_title(&["Let's plan a trip".to_string()], "ja")
            .await
            .unwrap();
        assert_eq!(title, "旅行の計画");
    }

    #[tokio::test]
    async fn test_api_error_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).chat(&[], "hi").await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Api {
                status: 401,
                message: "Incorrect API key provided (invalid_request_error)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_request() {
        let server = MockServer::start().await;
        let client = OpenAIClient::new(OpenAIConfig::new("", server.uri())).unwrap();
        let err = client.chat(&[], "hi").await.unwrap_err();
        assert_eq!(err, ProviderError::MissingApiKey);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "hello world"})))
            .mount(&server)
            .await;

        let text = client_for(&server)
            .transcribe(Bytes::from_static(b"RIFF"), "clip.wav")
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/speech"))
            .and(body_partial_json(json!({"model": "tts-1", "voice": "nova", "input": "Hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let audio = client_for(&server).synthesize("Hi").await.unwrap();
        assert_eq!(audio.as_ref(), &[0xFF, 0xFB, 0x90]);
    }

    #[test]
    fn test_audio_mime() {
        assert_eq!(audio_mime("a.WAV"), "audio/wav");
        assert_eq!(audio_mime("a.mp3"), "audio/mpeg");
        assert_eq!(audio_mime("blob"), "audio/webm");
    }

    #[test]
    fn test_title_prompt_lists_texts() {
        let prompt = title_prompt(&["a".to_string(), "b".to_string()], "en");
        assert!(prompt.contains("title with en"));
        assert!(prompt.ends_with("a\nb"));
    }
}
