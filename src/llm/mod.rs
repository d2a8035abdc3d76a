//! Text-generation clients used for LLM labelling and entity extraction.
//!
//! Two wire protocols are supported: OpenAI-compatible chat completions (vLLM, TGI, OpenAI) and
//! the Ollama `/api/generate` endpoint. Both return the raw completion text; callers own prompt
//! construction and response parsing.

use crate::config::{LlmConfig, LlmProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while requesting a completion.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Provider was unreachable or the endpoint does not exist.
    #[error("Completion provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate completion: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// A single completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instructions; may be empty.
    pub system: String,
    /// User prompt.
    pub prompt: String,
}

/// Interface implemented by text-generation backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate a completion for the supplied request.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

/// Build a completion client for the configured provider.
pub fn build_completion_client(
    config: &LlmConfig,
) -> Result<Arc<dyn CompletionClient>, CompletionError> {
    let http = http_client(config.timeout)?;
    match config.provider {
        LlmProvider::OpenAI => Ok(Arc::new(OpenAiChatClient {
            http,
            base_url: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })),
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient {
            http,
            base_url: config.endpoint.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })),
    }
}

fn http_client(timeout: Duration) -> Result<Client, CompletionError> {
    Client::builder()
        .user_agent("graphprep/llm")
        .timeout(timeout)
        .build()
        .map_err(|error| CompletionError::ProviderUnavailable(error.to_string()))
}

/// OpenAI-compatible `/v1/chat/completions` client.
pub struct OpenAiChatClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl OpenAiChatClient {
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut messages = Vec::with_capacity(2);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        messages.push(json!({ "role": "user", "content": request.prompt }));

        let mut builder = self.http.post(self.endpoint()).json(&json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": false,
        }));
        if let Some(key) = self.api_key.as_deref()
            && !key.is_empty()
        {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|error| {
            CompletionError::ProviderUnavailable(format!(
                "failed to reach {}: {error}",
                self.base_url
            ))
        })?;
        ensure_success(response.status(), &self.endpoint())?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode chat response: {error}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| CompletionError::InvalidResponse("response had no choices".into()))
    }
}

/// Ollama `/api/generate` client.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaClient {
    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl CompletionClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut payload = json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": false,
            "format": "json",
            "options": { "temperature": self.temperature },
        });
        if !request.system.is_empty() {
            payload["system"] = json!(request.system);
        }

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                CompletionError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;
        ensure_success(response.status(), &self.endpoint())?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            CompletionError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;
        if !body.done {
            return Err(CompletionError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }
        Ok(body.response.trim().to_string())
    }
}

fn ensure_success(status: StatusCode, endpoint: &str) -> Result<(), CompletionError> {
    if status == StatusCode::NOT_FOUND {
        return Err(CompletionError::ProviderUnavailable(format!(
            "endpoint {endpoint} returned 404"
        )));
    }
    Ok(())
}

/// Strip a surrounding Markdown code fence from a model response, if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().trim_end_matches("```").trim()
}
