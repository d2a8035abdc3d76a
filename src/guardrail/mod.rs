//! Safety classifier client consulted for every chunk before anything is written.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Classification returned by the guardrail service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    /// Chunk may be ingested.
    Safe,
    /// Chunk was flagged; carries the service's explanation when it gave one.
    Unsafe(Option<String>),
}

/// Errors raised while talking to the guardrail service.
#[derive(Debug, Error)]
pub enum GuardrailClientError {
    /// The service did not answer within the configured timeout.
    #[error("Guardrail timeout")]
    Timeout,
    /// The service answered with a non-success status.
    #[error("Guardrail service error (status {status})")]
    ServiceError {
        /// HTTP status returned by the service.
        status: u16,
    },
    /// The request could not be sent or the response could not be read.
    #[error("Guardrail request failed: {0}")]
    RequestFailed(String),
}

/// Interface implemented by safety classifiers.
#[async_trait]
pub trait GuardrailClient: Send + Sync {
    /// Classify one chunk of text.
    async fn check(&self, text: &str) -> Result<GuardrailVerdict, GuardrailClientError>;
}

/// HTTP guardrail client posting `{"text": ...}` to a single endpoint.
///
/// A response carrying a boolean `safe` field is taken at face value. Otherwise the service is
/// treated as a filter: the chunk is safe only when the returned `text` equals the input.
pub struct HttpGuardrailClient {
    http: Client,
    url: String,
}

impl HttpGuardrailClient {
    /// Build a client for `url` applying `timeout` to every request.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GuardrailClientError> {
        let http = Client::builder()
            .user_agent("graphprep/guardrail")
            .timeout(timeout)
            .build()
            .map_err(|error| GuardrailClientError::RequestFailed(error.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GuardrailResponse {
    #[serde(default)]
    safe: Option<bool>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

#[async_trait]
impl GuardrailClient for HttpGuardrailClient {
    async fn check(&self, text: &str) -> Result<GuardrailVerdict, GuardrailClientError> {
        let response = self
            .http
            .post(&self.url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GuardrailClientError::ServiceError {
                status: status.as_u16(),
            });
        }

        let body: GuardrailResponse = response.json().await.map_err(map_request_error)?;
        let safe = match body.safe {
            Some(flag) => flag,
            None => body.text.as_deref() == Some(text),
        };
        if safe {
            Ok(GuardrailVerdict::Safe)
        } else {
            Ok(GuardrailVerdict::Unsafe(body.reason))
        }
    }
}

fn map_request_error(error: reqwest::Error) -> GuardrailClientError {
    if error.is_timeout() {
        GuardrailClientError::Timeout
    } else {
        GuardrailClientError::RequestFailed(error.to_string())
    }
}
