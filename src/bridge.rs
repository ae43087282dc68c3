//! Trading bridge HTTP client.
//!
//! The bridge is the service that wraps the exchange API and the signal
//! generator. This client only knows how to reach it: JSON over HTTP,
//! bearer auth when a key is configured. POSTs are retried with exponential
//! backoff only when the bridge provably did not act on the request: the
//! connection was never established, or the bridge throttled it with 429.
//! A timeout or 5xx may arrive after the bridge already acted, so it is
//! returned to the caller as is.

use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, Secret};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Could not connect to bridge: {0}")]
    Connect(String),

    #[error("Bridge request timed out: {0}")]
    Timeout(String),

    #[error("Bridge returned HTTP {status}: {message}")]
    Remote {
        status: u16,
        /// Machine-readable error kind from the body, if any.
        kind: Option<String>,
        message: String,
    },

    #[error("Bridge transport error: {0}")]
    Transport(String),

    #[error("Invalid bridge response: {0}")]
    Decode(String),
}

impl BridgeError {
    /// True only when the request never reached the bridge's handler.
    fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Connect(_) => true,
            BridgeError::Remote { status, .. } => *status == 429,
            BridgeError::Timeout(_) | BridgeError::Transport(_) | BridgeError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            BridgeError::Connect(e.to_string())
        } else if e.is_timeout() {
            BridgeError::Timeout(e.to_string())
        } else if e.is_decode() {
            BridgeError::Decode(e.to_string())
        } else {
            BridgeError::Transport(e.to_string())
        }
    }
}

/// Error envelope: `{"error": {"kind": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Capabilities advertised by `GET /v2/capabilities`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub enhanced_analysis: bool,
    #[serde(default)]
    pub version: Option<String>,
}

pub struct BridgeClient {
    http: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

impl BridgeClient {
    pub fn new(
        base_url: &str,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, self.url(path))
            .header("Accept", "application/json");
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    /// Single GET, no retries.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BridgeError> {
        debug!(path, "Bridge GET");
        let response = self.request(Method::GET, path).query(query).send().await?;
        decode(response).await
    }

    /// POST with up to `max_retries` retries on connect failures and 429.
    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        max_retries: u32,
    ) -> Result<T, BridgeError> {
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, path, "Retrying bridge call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let result = match self.request(Method::POST, path).json(body).send().await {
                Ok(response) => decode(response).await,
                Err(e) => Err(BridgeError::from(e)),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!(attempt, path, error = %e, "Retryable bridge error");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, BridgeError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| BridgeError::Decode(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    Err(remote_error(status.as_u16(), &text))
}

fn remote_error(status: u16, body: &str) -> BridgeError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => BridgeError::Remote {
            status,
            kind: envelope.error.kind,
            message: envelope.error.message,
        },
        Err(_) => BridgeError::Remote {
            status,
            kind: None,
            message: body.trim().to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
