//! Sequential, fail-fast safety gate run before any graph write.

use crate::guardrail::{GuardrailClient, GuardrailClientError, GuardrailVerdict};
use std::sync::Arc;
use std::time::Duration;

/// Why a chunk stopped the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailFailure {
    /// The classifier flagged the chunk.
    Unsafe(Option<String>),
    /// The classifier did not answer in time.
    Timeout,
    /// The classifier answered with an error status.
    ServiceError(u16),
    /// The request to the classifier failed.
    RequestFailed(String),
}

impl GuardrailFailure {
    /// Human-readable reason surfaced to callers.
    pub fn reason(&self) -> String {
        match self {
            Self::Unsafe(Some(detail)) => format!("Harmful content detected: {detail}"),
            Self::Unsafe(None) => "Harmful content detected".to_string(),
            Self::Timeout => "Guardrail timeout".to_string(),
            Self::ServiceError(status) => format!("Guardrail service error (status {status})"),
            Self::RequestFailed(detail) => format!("Guardrail request failed: {detail}"),
        }
    }
}

/// Result of running the gate over a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailOutcome {
    /// Every chunk passed, or the gate is disabled.
    Passed,
    /// The chunk at `chunk_index` stopped the gate; later chunks were not checked.
    Blocked {
        /// Zero-based index of the first failing chunk.
        chunk_index: usize,
        /// Why it failed.
        failure: GuardrailFailure,
    },
}

/// Gate checking chunks one at a time in index order.
pub struct GuardrailGate {
    client: Option<Arc<dyn GuardrailClient>>,
    timeout: Duration,
}

impl GuardrailGate {
    /// Gate backed by `client`; each check is bounded by `timeout`.
    pub fn new(client: Arc<dyn GuardrailClient>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            timeout,
        }
    }

    /// Pass-through gate used when the guardrail is disabled.
    pub fn disabled() -> Self {
        Self {
            client: None,
            timeout: Duration::ZERO,
        }
    }

    /// Whether checks are actually performed.
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Check `chunks` in order, stopping at the first failure.
    pub async fn check(&self, chunks: &[String]) -> GuardrailOutcome {
        let Some(client) = self.client.as_ref() else {
            return GuardrailOutcome::Passed;
        };

        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let verdict = tokio::time::timeout(self.timeout, client.check(chunk)).await;
            let failure = match verdict {
                Ok(Ok(GuardrailVerdict::Safe)) => continue,
                Ok(Ok(GuardrailVerdict::Unsafe(detail))) => GuardrailFailure::Unsafe(detail),
                Ok(Err(GuardrailClientError::Timeout)) | Err(_) => GuardrailFailure::Timeout,
                Ok(Err(GuardrailClientError::ServiceError { status })) => {
                    GuardrailFailure::ServiceError(status)
                }
                Ok(Err(GuardrailClientError::RequestFailed(detail))) => {
                    GuardrailFailure::RequestFailed(detail)
                }
            };
            tracing::warn!(chunk_index, reason = %failure.reason(), "Guardrail blocked chunk");
            return GuardrailOutcome::Blocked {
                chunk_index,
                failure,
            };
        }
        GuardrailOutcome::Passed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedGuardrail {
        unsafe_marker: &'static str,
        slow_marker: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GuardrailClient for ScriptedGuardrail {
        async fn check(&self, text: &str) -> Result<GuardrailVerdict, GuardrailClientError> {
            self.seen.lock().expect("lock").push(text.to_string());
            if text.contains(self.slow_marker) {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if text.contains(self.unsafe_marker) {
                Ok(GuardrailVerdict::Unsafe(None))
            } else {
                Ok(GuardrailVerdict::Safe)
            }
        }
    }

    fn scripted() -> Arc<ScriptedGuardrail> {
        Arc::new(ScriptedGuardrail {
            unsafe_marker: "attack",
            slow_marker: "stall",
            seen: Mutex::new(Vec::new()),
        })
    }

    fn chunks(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[tokio::test]
    async fn stops_at_first_unsafe_chunk() {
        let client = scripted();
        let gate = GuardrailGate::new(client.clone(), Duration::from_secs(1));
        let outcome = gate
            .check(&chunks(&["fine", "attack plan", "also attack", "fine"]))
            .await;

        assert_eq!(
            outcome,
            GuardrailOutcome::Blocked {
                chunk_index: 1,
                failure: GuardrailFailure::Unsafe(None),
            }
        );
        assert_eq!(client.seen.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn timeout_is_distinct_from_unsafe() {
        let gate = GuardrailGate::new(scripted(), Duration::from_millis(20));
        let outcome = gate.check(&chunks(&["stall here"])).await;
        assert!(matches!(
            outcome,
            GuardrailOutcome::Blocked {
                chunk_index: 0,
                failure: GuardrailFailure::Timeout
            }
        ));
    }

    #[tokio::test]
    async fn disabled_gate_passes_everything() {
        let outcome = GuardrailGate::disabled().check(&chunks(&["attack"])).await;
        assert_eq!(outcome, GuardrailOutcome::Passed);
    }
}
