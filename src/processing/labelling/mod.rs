//! Label assignment strategies.
//!
//! Every strategy returns, per chunk, labels drawn only from the ingestion's [`LabelSet`]. Each
//! one filters its own output against the set; none relies on the caller to do it.

mod bm25;
mod embedding;
mod llm;

pub use bm25::{Bm25Index, Bm25Labeller};
pub use embedding::EmbeddingLabeller;
pub use llm::{LlmLabeller, MAX_LABEL_ATTEMPTS, parse_label_response};

use crate::config::{LabellingConfig, LabellingStrategy};
use crate::embedding::EmbeddingClient;
use crate::labels::LabelSet;
use crate::llm::CompletionClient;
use async_trait::async_trait;
use std::sync::Arc;

/// Labels chosen for each chunk of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelAssignment {
    /// Labels per chunk, indexed like the input chunks.
    pub labels: Vec<Vec<String>>,
    /// Chunks that fell back to empty labels after a strategy failure.
    pub degraded: usize,
}

impl LabelAssignment {
    /// Assignment with empty labels for `count` chunks, all counted as degraded.
    pub fn all_degraded(count: usize) -> Self {
        Self {
            labels: vec![Vec::new(); count],
            degraded: count,
        }
    }
}

/// Strategy assigning labels to chunks.
#[async_trait]
pub trait Labeller: Send + Sync {
    /// Assign labels to every chunk; failures degrade to empty labels, never to an error.
    async fn label(&self, chunks: &[String], labels: &LabelSet) -> LabelAssignment;
}

/// Build the labeller selected by configuration.
pub fn build_labeller(
    config: &LabellingConfig,
    embeddings: Arc<dyn EmbeddingClient>,
    completions: Arc<dyn CompletionClient>,
) -> Arc<dyn Labeller> {
    match config.strategy {
        LabellingStrategy::Bm25 => Arc::new(Bm25Labeller::new(config.bm25_threshold)),
        LabellingStrategy::Embedding => Arc::new(EmbeddingLabeller::new(
            embeddings,
            config.embedding_threshold,
        )),
        LabellingStrategy::Llm => Arc::new(LlmLabeller::new(
            completions,
            config.llm_system_prompt.clone(),
            config.llm_concurrency,
        )),
    }
}

/// Keep only names present in `labels`, preserving order and dropping duplicates.
pub(crate) fn retain_known(candidates: Vec<String>, labels: &LabelSet) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if labels.contains(&candidate) && !kept.contains(&candidate) {
            kept.push(candidate);
        }
    }
    kept
}
