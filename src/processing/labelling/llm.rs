use super::{LabelAssignment, Labeller};
use crate::labels::LabelSet;
use crate::llm::{CompletionClient, CompletionRequest, strip_code_fence};
use crate::processing::retry::{RetryOutcome, retry_with_validator};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Attempts per chunk before falling back to empty labels.
pub const MAX_LABEL_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct LabelResponse {
    labels: Vec<String>,
}

/// Parse `{"labels": [...]}` and require every label to belong to `labels`.
pub fn parse_label_response(raw: &str, labels: &LabelSet) -> Result<Vec<String>, String> {
    let parsed: LabelResponse = serde_json::from_str(strip_code_fence(raw))
        .map_err(|error| format!("invalid label JSON: {error}"))?;
    if let Some(unknown) = parsed.labels.iter().find(|label| !labels.contains(label)) {
        return Err(format!("label {unknown:?} is not in the label directory"));
    }
    let mut selected: Vec<String> = Vec::with_capacity(parsed.labels.len());
    for label in parsed.labels {
        if !selected.contains(&label) {
            selected.push(label);
        }
    }
    Ok(selected)
}

/// Labeller asking a language model to pick labels, one bounded-concurrency task per chunk.
pub struct LlmLabeller {
    client: Arc<dyn CompletionClient>,
    system_prompt: Arc<str>,
    permits: Arc<Semaphore>,
}

impl LlmLabeller {
    /// Labeller issuing at most `concurrency` classification calls at once.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        system_prompt: impl Into<Arc<str>>,
        concurrency: usize,
    ) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }
}

async fn label_chunk(
    client: Arc<dyn CompletionClient>,
    system_prompt: Arc<str>,
    chunk: String,
    labels: Arc<LabelSet>,
    label_list: Arc<str>,
) -> RetryOutcome<Vec<String>, String> {
    let prompt = format!("Input: {chunk}\nLabels: {label_list}");
    retry_with_validator(
        MAX_LABEL_ATTEMPTS,
        |_| {
            let client = client.clone();
            let request = CompletionRequest {
                system: system_prompt.to_string(),
                prompt: prompt.clone(),
            };
            async move {
                client
                    .complete(request)
                    .await
                    .map_err(|error| error.to_string())
            }
        },
        |raw| parse_label_response(&raw, &labels),
    )
    .await
}

#[async_trait]
impl Labeller for LlmLabeller {
    async fn label(&self, chunks: &[String], labels: &LabelSet) -> LabelAssignment {
        let labels = Arc::new(labels.clone());
        let label_list: Arc<str> = serde_json::to_string(labels.names())
            .unwrap_or_else(|_| "[]".to_string())
            .into();

        let mut tasks = JoinSet::new();
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let permits = self.permits.clone();
            let client = self.client.clone();
            let system_prompt = self.system_prompt.clone();
            let labels = labels.clone();
            let label_list = label_list.clone();
            let chunk = chunk.clone();
            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (chunk_index, None);
                };
                let outcome = label_chunk(client, system_prompt, chunk, labels, label_list).await;
                (chunk_index, Some(outcome))
            });
        }

        let mut assignment = LabelAssignment {
            labels: vec![Vec::new(); chunks.len()],
            degraded: 0,
        };
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((chunk_index, Some(RetryOutcome::Accepted { value, attempts }))) => {
                    if attempts > 1 {
                        tracing::debug!(chunk_index, attempts, "Labels accepted after retry");
                    }
                    assignment.labels[chunk_index] = value;
                }
                Ok((chunk_index, Some(RetryOutcome::Exhausted { attempts, last_error }))) => {
                    tracing::warn!(
                        chunk_index,
                        attempts,
                        error = last_error.as_deref().unwrap_or("unknown"),
                        "LLM labelling exhausted retries; assigning empty labels"
                    );
                    assignment.degraded += 1;
                }
                Ok((chunk_index, None)) => {
                    tracing::warn!(chunk_index, "Labelling pool closed; assigning empty labels");
                    assignment.degraded += 1;
                }
                Err(error) => {
                    tracing::error!(error = %error, "Labelling task failed");
                    assignment.degraded += 1;
                }
            }
        }
        assignment
    }
}
