use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::warn;

use shared::protocol::TokenResponse;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    /// The backend produced no usable provider token for this attempt.
    /// Terminal for the attempt; retrying is the caller's decision.
    #[error("no provider token available")]
    Unavailable,
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch_token(&self) -> Result<String, CredentialError>;
}

/// Exchanges the application session token for a provider access token via
/// `GET {api_base}/chat/token`. Fetching is side-effect free: every failure
/// collapses to `CredentialError::Unavailable`.
pub struct HttpCredentialSource {
    http: Client,
    api_base: String,
    auth_token: String,
}

impl HttpCredentialSource {
    pub fn new(api_base: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into(),
            auth_token: auth_token.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    async fn fetch_token(&self) -> Result<String, CredentialError> {
        let response = self
            .http
            .get(format!("{}/chat/token", self.api_base))
            .header(reqwest::header::AUTHORIZATION, &self.auth_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|err| {
                warn!(%err, "chat token request failed");
                CredentialError::Unavailable
            })?;

        let body: TokenResponse = response.json().await.map_err(|err| {
            warn!(%err, "chat token response was not valid json");
            CredentialError::Unavailable
        })?;
        Ok(body.twilio_token)
    }
}

#[cfg(test)]
#[path = "tests/credentials_tests.rs"]
mod tests;
