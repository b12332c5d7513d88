//! Bearer token acquisition and caching
//!
//! The source API issues short-lived bearer tokens through a client-credentials
//! exchange. `AuthContext` owns the cached token for one sync scope and is
//! shared with the executor through an `Arc`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ApiError;

/// A bearer token with its expiry
#[derive(Clone, PartialEq)]
pub struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token that expires at `expires_at`
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Raw token value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Expiry
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// True while `now + buffer` is still before expiry
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        now + buffer < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Credentials and token cache for the source API
pub struct AuthContext {
    auth_url: String,
    api_key: String,
    refresh_buffer: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("auth_url", &self.auth_url)
            .field("api_key", &"[REDACTED]")
            .field("refresh_buffer", &self.refresh_buffer)
            .finish()
    }
}

impl AuthContext {
    /// Create an auth context for the given token endpoint and API key
    pub fn new(auth_url: impl Into<String>, api_key: impl Into<String>, refresh_buffer_secs: u64) -> Self {
        Self {
            auth_url: auth_url.into(),
            api_key: api_key.into(),
            refresh_buffer: Duration::seconds(refresh_buffer_secs as i64),
            cached: Mutex::new(None),
        }
    }

    /// Return a fresh token value, exchanging credentials when needed
    ///
    /// The cache lock is released during the exchange, so concurrent callers
    /// may refresh redundantly.
    pub async fn token(&self, client: &Client) -> Result<String, ApiError> {
        {
            let cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref() {
                if token.is_fresh(Utc::now(), self.refresh_buffer) {
                    return Ok(token.value().to_string());
                }
            }
        }

        let token = self.exchange(client).await?;
        let value = token.value().to_string();
        *self.cached.lock().await = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call re-authenticates
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Currently cached token, if any
    pub async fn cached(&self) -> Option<AccessToken> {
        self.cached.lock().await.clone()
    }

    async fn exchange(&self, client: &Client) -> Result<AccessToken, ApiError> {
        debug!(auth_url = %self.auth_url, "Requesting access token");

        let credentials = STANDARD.encode(format!("APIKEY:{}", self.api_key));
        let response = client
            .post(&self.auth_url)
            .header(AUTHORIZATION, format!("Basic {}", credentials))
            .form(&[("grant_type", "client_credentials"), ("scope", "auto")])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ApiError::Network(e.to_string())
                } else {
                    ApiError::AuthFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Token exchange rejected");
            return Err(ApiError::AuthFailed(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::AuthFailed(format!("unreadable token response: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(body.expires_in.max(0));
        debug!(expires_at = %expires_at, "Access token acquired");
        Ok(AccessToken::new(body.access_token, expires_at))
    }
}
