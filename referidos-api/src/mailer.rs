//! Transactional email delivery
//!
//! Production delivery goes through the Resend HTTP API. Sends are always
//! best-effort from the caller's point of view.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const RESEND_BASE_URL: &str = "https://api.resend.com/emails";
const USER_AGENT: &str = concat!("referidos-api/", env!("CARGO_PKG_VERSION"));

/// Outgoing email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Mail delivery errors
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email delivery not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Email provider error {0}: {1}")]
    Provider(u16, String),
}

/// Sends email
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Resend API client
pub struct ResendMailer {
    http_client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendMailer {
    pub fn new(api_key: String) -> Result<Self, MailError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MailError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            endpoint: RESEND_BASE_URL.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| MailError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailError::Provider(status.as_u16(), error_text));
        }

        tracing::debug!(to = %message.to, subject = %message.subject, "Email accepted by provider");
        Ok(())
    }
}

/// Used when no API key is configured: every send fails
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _message: &EmailMessage) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}
