//! Realtime provider connection settings.

use std::time::Duration;
use zeroize::Zeroize;

use crate::core::relay::DEFAULT_CLOSE_TIMEOUT;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Model requested when none is configured.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-12-17";

/// Beta header value required by the Realtime API.
pub const OPENAI_BETA_HEADER: &str = "realtime=v1";

/// Everything needed to open one provider connection.
#[derive(Clone)]
pub struct RealtimeUpstreamConfig {
    /// Base WebSocket URL, without query string.
    pub url: String,
    /// Sent as the `model` query parameter.
    pub model: String,
    /// Bearer credential.
    pub api_key: String,
    /// Largest message accepted from the provider.
    pub max_message_bytes: usize,
    /// Bound on the close handshake with the provider.
    pub close_timeout: Duration,
}

impl RealtimeUpstreamConfig {
    pub fn new(api_key: impl Into<String>, max_message_bytes: usize) -> Self {
        Self {
            url: OPENAI_REALTIME_URL.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            api_key: api_key.into(),
            max_message_bytes,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

impl std::fmt::Debug for RealtimeUpstreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeUpstreamConfig")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("max_message_bytes", &self.max_message_bytes)
            .field("close_timeout", &self.close_timeout)
            .finish()
    }
}

impl Drop for RealtimeUpstreamConfig {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}
