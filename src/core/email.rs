//! Outgoing mail for one-time codes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::EmailConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailError {
    #[error("Email request failed: {0}")]
    Request(String),

    #[error("Email API rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub type EmailResult<T> = Result<T, EmailError>;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> EmailResult<()>;
}

#[derive(Debug, Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Posts messages as JSON to an HTTP mail API with a bearer key.
pub struct HttpEmailSender {
    config: EmailConfig,
    http_client: Client,
}

impl HttpEmailSender {
    pub fn new(config: EmailConfig) -> EmailResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| EmailError::Request(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> EmailResult<()> {
        let message = OutgoingEmail {
            from: &self.config.from,
            to,
            subject,
            text: body,
        };

        let response = self
            .http_client
            .post(&self.config.api_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&message)
            .send()
            .await
            .map_err(|e| EmailError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Email API rejected message");
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Email sent successfully");
        Ok(())
    }
}

/// Used when no mail API is configured. Codes end up in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_text(&self, to: &str, subject: &str, body: &str) -> EmailResult<()> {
        info!(to, subject, body, "Email delivery not configured, logging message");
        Ok(())
    }
}
