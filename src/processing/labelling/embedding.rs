use super::{LabelAssignment, Labeller, retain_known};
use crate::embedding::{EmbeddingClient, cosine_similarity};
use crate::labels::LabelSet;
use async_trait::async_trait;
use std::sync::Arc;

/// Semantic labeller comparing chunk and label embeddings by cosine similarity.
pub struct EmbeddingLabeller {
    client: Arc<dyn EmbeddingClient>,
    threshold: f32,
}

impl EmbeddingLabeller {
    /// Labeller accepting similarities `>= threshold`.
    pub fn new(client: Arc<dyn EmbeddingClient>, threshold: f32) -> Self {
        Self { client, threshold }
    }
}

#[async_trait]
impl Labeller for EmbeddingLabeller {
    async fn label(&self, chunks: &[String], labels: &LabelSet) -> LabelAssignment {
        if labels.is_empty() {
            return LabelAssignment {
                labels: vec![Vec::new(); chunks.len()],
                degraded: 0,
            };
        }

        let label_vectors = match self.client.generate_embeddings(labels.names().to_vec()).await {
            Ok(vectors) if vectors.len() == labels.len() => vectors,
            Ok(vectors) => {
                tracing::warn!(
                    expected = labels.len(),
                    received = vectors.len(),
                    "Label embedding count mismatch; assigning empty labels"
                );
                return LabelAssignment::all_degraded(chunks.len());
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to embed labels; assigning empty labels");
                return LabelAssignment::all_degraded(chunks.len());
            }
        };

        let mut assignment = LabelAssignment {
            labels: Vec::with_capacity(chunks.len()),
            degraded: 0,
        };
        for (chunk_index, chunk) in chunks.iter().enumerate() {
            let chunk_vector = match self.client.generate_embeddings(vec![chunk.clone()]).await {
                Ok(mut vectors) if !vectors.is_empty() => vectors.swap_remove(0),
                Ok(_) => {
                    tracing::warn!(chunk_index, "Embedding provider returned no vector");
                    assignment.labels.push(Vec::new());
                    assignment.degraded += 1;
                    continue;
                }
                Err(error) => {
                    tracing::warn!(
                        chunk_index,
                        error = %error,
                        "Chunk embedding failed; empty labels"
                    );
                    assignment.labels.push(Vec::new());
                    assignment.degraded += 1;
                    continue;
                }
            };

            let selected = labels
                .names()
                .iter()
                .zip(&label_vectors)
                .filter(|(_, vector)| cosine_similarity(&chunk_vector, vector) >= self.threshold)
                .map(|(name, _)| name.clone())
                .collect();
            assignment.labels.push(retain_known(selected, labels));
        }
        assignment
    }
}
