//! Authenticated HTTP executor with status-driven retries
//!
//! Every request carries a bearer token from the shared `AuthContext`.
//! Responses are classified in a fixed order: 429 waits for `Retry-After`,
//! 401 re-authenticates once, 5xx and transport failures share one backoff
//! budget, and any other non-2xx fails immediately.

use bytes::Bytes;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::auth::AuthContext;
use super::retry::{parse_retry_after, Backoff};
use crate::config::RetryConfig;
use crate::error::ApiError;

/// Query parameters as ordered key/value pairs
pub type QueryParams = Vec<(String, String)>;

/// Longest response excerpt carried in an error
const ERROR_EXCERPT_LEN: usize = 200;

/// Outcome of a single HTTP attempt that did not succeed
#[derive(Debug)]
enum Failure {
    Timeout(String),
    Network(String),
    Status {
        status: StatusCode,
        retry_after: Option<Duration>,
        excerpt: String,
    },
}

/// Authenticated request executor for the source API
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    base_url: String,
    auth: Arc<AuthContext>,
    config: RetryConfig,
}

impl HttpExecutor {
    /// Create an executor rooted at `base_url`
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        auth: Arc<AuthContext>,
        config: RetryConfig,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            config,
        }
    }

    /// Build a reqwest client with the per-request deadline
    pub fn build_client(timeout: Duration) -> Result<Client, ApiError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform a request and return the response body
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let max_retries = self.config.max_retries;
        let mut backoff = Backoff::new(&self.config);
        let mut transient_retries = 0u32;
        let mut rate_limit_retries = 0u32;
        let mut reauthenticated = false;

        loop {
            let token = self.auth.token(&self.client).await?;

            let failure = match self.send_once(&method, &url, &token, params, body).await {
                Ok(bytes) => return Ok(bytes),
                Err(failure) => failure,
            };

            match failure {
                Failure::Status {
                    status: StatusCode::TOO_MANY_REQUESTS,
                    retry_after,
                    ..
                } => {
                    if rate_limit_retries >= max_retries {
                        warn!(url = %url, retries = rate_limit_retries, "Rate limit retries exhausted");
                        return Err(ApiError::RateLimited {
                            retries: rate_limit_retries,
                        });
                    }
                    let wait = retry_after.unwrap_or_else(|| {
                        Duration::from_secs(self.config.rate_limit_default_wait_secs)
                    });
                    rate_limit_retries += 1;
                    warn!(
                        url = %url,
                        wait_ms = wait.as_millis() as u64,
                        attempt = rate_limit_retries,
                        "Rate limited by source API"
                    );
                    tokio::time::sleep(wait).await;
                }
                Failure::Status {
                    status: StatusCode::UNAUTHORIZED,
                    ..
                } => {
                    if reauthenticated {
                        return Err(ApiError::AuthFailed(
                            "request rejected after re-authentication".to_string(),
                        ));
                    }
                    warn!(url = %url, "Token rejected, re-authenticating");
                    self.auth.invalidate().await;
                    reauthenticated = true;
                }
                Failure::Status {
                    status, excerpt, ..
                } if status.is_server_error() => {
                    if transient_retries >= max_retries {
                        return Err(ApiError::Api {
                            status: status.as_u16(),
                            message: excerpt,
                            transient: true,
                        });
                    }
                    transient_retries += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        url = %url,
                        status = status.as_u16(),
                        attempt = transient_retries,
                        backoff_ms = delay.as_millis() as u64,
                        "Server error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Failure::Status {
                    status, excerpt, ..
                } => {
                    warn!(url = %url, status = status.as_u16(), "Unexpected status");
                    return Err(ApiError::Api {
                        status: status.as_u16(),
                        message: excerpt,
                        transient: false,
                    });
                }
                Failure::Timeout(detail) | Failure::Network(detail)
                    if transient_retries < max_retries =>
                {
                    transient_retries += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        url = %url,
                        error = %detail,
                        attempt = transient_retries,
                        backoff_ms = delay.as_millis() as u64,
                        "Transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Failure::Timeout(_) => {
                    return Err(ApiError::Timeout {
                        retries: transient_retries,
                    })
                }
                Failure::Network(detail) => return Err(ApiError::Network(detail)),
            }
        }
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ApiError> {
        let bytes = self.request(Method::GET, path, params, None).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", path, e)))
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &str,
        token: &str,
        params: &[(String, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<Bytes, Failure> {
        debug!(method = %method, url = url, "Sending source API request");

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .query(params);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await.map_err(classify_transport)?;
            debug!(url = url, body_size = bytes.len(), "Received response");
            return Ok(bytes);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let text = response.text().await.unwrap_or_default();

        Err(Failure::Status {
            status,
            retry_after,
            excerpt: excerpt(&text),
        })
    }
}

fn classify_transport(err: reqwest::Error) -> Failure {
    if err.is_timeout() {
        Failure::Timeout(err.to_string())
    } else {
        Failure::Network(err.to_string())
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_EXCERPT_LEN) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
