//! Cascading removal of everything derived from one document.

use super::types::RetractionError;
use crate::graph::{GraphStore, GraphStoreError};
use std::sync::Arc;

/// Result of one retraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetractionOutcome {
    /// Identifiers of the chunk nodes that were removed.
    pub deleted_chunk_ids: Vec<String>,
    /// Sourcing edges removed because their chunk went away.
    pub source_edges_removed: u64,
    /// Entities removed because they no longer had any sourcing edge.
    pub orphan_entities_removed: u64,
    /// Edges removed because an endpoint no longer resolved.
    pub dangling_edges_removed: u64,
}

/// Runs the six ordered retraction steps against a graph store.
///
/// Steps run strictly in order since each filter depends on the deletions before it. Entities
/// orphaned indirectly by a later step are left for the next pass.
#[derive(Clone)]
pub struct RetractionEngine {
    store: Arc<dyn GraphStore>,
}

fn at_step(step: u8) -> impl FnOnce(GraphStoreError) -> RetractionError {
    move |source| RetractionError { step, source }
}

impl RetractionEngine {
    /// Engine deleting from `store`.
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Remove every chunk tagged with `file_id` and repair what that leaves behind.
    ///
    /// Safe to repeat: a second call finds no chunks and only re-runs the graph-wide repairs.
    pub async fn retract(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<RetractionOutcome, RetractionError> {
        let chunk_ids = self
            .store
            .chunk_ids_for_file(graph, file_id)
            .await
            .map_err(at_step(1))?;
        tracing::debug!(graph, file_id, chunks = chunk_ids.len(), "Collected chunks to retract");

        let mut outcome = RetractionOutcome::default();
        if !chunk_ids.is_empty() {
            self.store
                .delete_chunks(graph, &chunk_ids)
                .await
                .map_err(at_step(2))?;
            outcome.source_edges_removed = self
                .store
                .delete_source_edges_to(graph, &chunk_ids)
                .await
                .map_err(at_step(3))?;
        }

        outcome.orphan_entities_removed = self
            .store
            .delete_orphan_entities(graph, file_id)
            .await
            .map_err(at_step(4))?;
        outcome.dangling_edges_removed = self
            .store
            .delete_dangling_source_edges(graph)
            .await
            .map_err(at_step(5))?;
        outcome.dangling_edges_removed += self
            .store
            .delete_dangling_relationship_edges(graph)
            .await
            .map_err(at_step(6))?;

        outcome.deleted_chunk_ids = chunk_ids;
        tracing::info!(
            graph,
            file_id,
            deleted_chunks = outcome.deleted_chunk_ids.len(),
            source_edges = outcome.source_edges_removed,
            orphan_entities = outcome.orphan_entities_removed,
            dangling_edges = outcome.dangling_edges_removed,
            "Retraction complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        CommitOptions, GraphDocument, GraphNode, GraphRelationship, InMemoryGraphStore,
        SourceChunk,
    };
    use serde_json::Map;

    fn node(name: &str) -> GraphNode {
        GraphNode {
            id: name.into(),
            node_type: "Organization".into(),
            properties: Map::new(),
            embedding: None,
        }
    }

    fn document(file_id: &str, chunk_index: usize, entities: &[&str]) -> GraphDocument {
        let relationships = entities
            .windows(2)
            .map(|pair| GraphRelationship {
                source: pair[0].into(),
                target: pair[1].into(),
                rel_type: "RELATED_TO".into(),
                properties: Map::new(),
                embedding: None,
            })
            .collect();
        GraphDocument {
            nodes: entities.iter().map(|name| node(name)).collect(),
            relationships,
            source: SourceChunk {
                file_id: file_id.into(),
                file_path: format!("/data/{file_id}"),
                chunk_index,
                chunk_labels: Vec::new(),
                text: format!("chunk {chunk_index} of {file_id}"),
                embedding: None,
            },
        }
    }

    async fn seeded_store() -> Arc<InMemoryGraphStore> {
        let store = Arc::new(InMemoryGraphStore::new());
        let options = CommitOptions::default();
        store.ensure_graph("G").await.expect("graph");
        for (index, entities) in [["ACME", "SHARED"], ["ONLY_A", "ACME"], ["ACME", "ONLY_A"]]
            .iter()
            .enumerate()
        {
            store
                .commit("G", &document("A", index, entities), &options)
                .await
                .expect("commit A");
        }
        for index in 0..2 {
            store
                .commit("G", &document("B", index, &["SHARED", "ONLY_B"]), &options)
                .await
                .expect("commit B");
        }
        store
    }

    #[tokio::test]
    async fn shared_entities_survive_while_exclusive_ones_go() {
        let store = seeded_store().await;
        let engine = RetractionEngine::new(store.clone());

        let outcome = engine.retract("G", "A").await.expect("retract");
        assert_eq!(outcome.deleted_chunk_ids.len(), 3);
        assert_eq!(outcome.orphan_entities_removed, 2);

        let snapshot = store.snapshot("G");
        assert!(snapshot.chunks.iter().all(|(file_id, _, _)| file_id == "B"));
        assert_eq!(snapshot.entities, vec!["ONLY_B", "SHARED"]);
        assert_eq!(
            snapshot.relationships,
            vec![("SHARED".to_string(), "ONLY_B".to_string(), "RELATED_TO".to_string())]
        );
        assert_eq!(snapshot.relationship_edges, snapshot.relationships.len());
    }

    #[tokio::test]
    async fn second_retraction_is_empty_and_succeeds() {
        let store = seeded_store().await;
        let engine = RetractionEngine::new(store.clone());

        let first = engine.retract("G", "A").await.expect("first");
        let before = store.snapshot("G");
        let second = engine.retract("G", "A").await.expect("second");

        assert!(!first.deleted_chunk_ids.is_empty());
        assert!(second.deleted_chunk_ids.is_empty());
        assert_eq!(second.orphan_entities_removed, 0);
        assert_eq!(store.snapshot("G"), before);
    }

    #[tokio::test]
    async fn unknown_file_leaves_graph_untouched() {
        let store = seeded_store().await;
        let before = store.snapshot("G");
        let outcome = RetractionEngine::new(store.clone())
            .retract("G", "missing")
            .await
            .expect("retract");
        assert!(outcome.deleted_chunk_ids.is_empty());
        assert_eq!(store.snapshot("G"), before);
    }
}
