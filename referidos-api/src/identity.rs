//! Identity provider client
//!
//! Access tokens are opaque here: the provider turns one into a user id and
//! email, or reports it invalid. OTP, magic links and passwords happen on the
//! provider side.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str = concat!("referidos-api/", env!("CARGO_PKG_VERSION"));

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity provider errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Identity provider error {0}: {1}")]
    Provider(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Resolves access tokens to identities
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the token is invalid or expired
    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, IdentityError>;
}

/// Resolve a token, folding provider failures into "no identity"
pub async fn resolve_user(provider: &dyn IdentityProvider, access_token: &str) -> Option<AuthUser> {
    if access_token.is_empty() {
        return None;
    }
    match provider.get_user(access_token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Identity lookup failed: {}", e);
            None
        }
    }
}

/// GoTrue-compatible client (`GET {base}/auth/v1/user`)
pub struct GoTrueClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoTrueClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, IdentityError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn user_url(&self) -> String {
        format!("{}/auth/v1/user", self.base_url)
    }
}

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, IdentityError> {
        let mut request = self.http_client.get(self.user_url()).bearer_auth(access_token);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IdentityError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IdentityError::Provider(status.as_u16(), error_text));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| IdentityError::Parse(e.to_string()))?;

        tracing::debug!(user_id = %user.id, "Access token resolved");
        Ok(Some(user))
    }
}

/// Provider used when no auth service is configured: every lookup fails
pub struct UnconfiguredIdentityProvider;

#[async_trait]
impl IdentityProvider for UnconfiguredIdentityProvider {
    async fn get_user(&self, _access_token: &str) -> Result<Option<AuthUser>, IdentityError> {
        Err(IdentityError::NotConfigured)
    }
}

/// In-memory token table, for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, AuthUser>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: &str, id: &str, email: Option<&str>) -> Self {
        self.users.insert(
            token.to_string(),
            AuthUser {
                id: id.to_string(),
                email: email.map(str::to_string),
            },
        );
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn get_user(&self, access_token: &str) -> Result<Option<AuthUser>, IdentityError> {
        Ok(self.users.get(access_token).cloned())
    }
}
