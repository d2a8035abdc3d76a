//! In-process graph store with the same collection layout as the ArangoDB store.
//!
//! Used for dry runs and tests. Identifiers follow the `{collection}/{key}` form so retraction
//! results are interchangeable between stores.

use crate::graph::store::{CommitOptions, GraphStore, GraphStoreError};
use crate::graph::types::{GraphDocument, SourceChunk, entity_key};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredEntity {
    name: String,
    entity_type: String,
    properties: Map<String, Value>,
    embedding: Option<Vec<f32>>,
    /// Documents that committed this entity without a source node.
    claims: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SourceEdge {
    from: String,
    to: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RelationshipEdge {
    from: String,
    to: String,
    rel_type: String,
}

#[derive(Debug, Default)]
struct GraphState {
    sources: BTreeMap<String, SourceChunk>,
    entities: BTreeMap<String, StoredEntity>,
    source_edges: Vec<SourceEdge>,
    relationship_edges: Vec<RelationshipEdge>,
}

#[derive(Debug, Default)]
struct StoreState {
    graphs: HashMap<String, GraphState>,
    commits: usize,
    fail_after: Option<usize>,
    fail_retraction_step: Option<u8>,
}

/// Point-in-time view of one graph, for assertions and reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphSnapshot {
    /// `(file_id, chunk_index, labels)` for every stored chunk, ordered by identifier.
    pub chunks: Vec<(String, usize, Vec<String>)>,
    /// Stored entity names, sorted.
    pub entities: Vec<String>,
    /// Number of sourcing edges.
    pub source_edges: usize,
    /// `(source name, target name, type)` for every relationship edge whose endpoints resolve.
    pub relationships: Vec<(String, String, String)>,
    /// Number of relationship edges, dangling ones included.
    pub relationship_edges: usize,
}

impl GraphSnapshot {
    /// Total number of stored nodes and edges.
    pub fn total_items(&self) -> usize {
        self.chunks.len() + self.entities.len() + self.source_edges + self.relationship_edges
    }
}

/// Mutex-guarded graph store living entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: Mutex<StoreState>,
}

fn source_id(graph: &str, key: &str) -> String {
    format!("{graph}_SOURCE/{key}")
}

fn entity_id(graph: &str, key: &str) -> String {
    format!("{graph}_ENTITY/{key}")
}

fn key_of(id: &str) -> &str {
    id.rsplit_once('/').map_or(id, |(_, key)| key)
}

impl InMemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every commit after the first `successful` ones fail.
    pub fn fail_commits_after(&self, successful: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_after = Some(successful);
        }
    }

    /// Make the retraction primitive for `step` (1 to 6, in trait order) fail on every call.
    pub fn fail_retraction_step(&self, step: u8) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_retraction_step = Some(step);
        }
    }

    /// Number of commits accepted so far.
    pub fn commit_count(&self) -> usize {
        self.state.lock().map(|state| state.commits).unwrap_or(0)
    }

    /// Capture the current contents of `graph`.
    pub fn snapshot(&self, graph: &str) -> GraphSnapshot {
        let Ok(state) = self.state.lock() else {
            return GraphSnapshot::default();
        };
        let Some(graph_state) = state.graphs.get(graph) else {
            return GraphSnapshot::default();
        };

        let mut entities: Vec<String> = graph_state
            .entities
            .values()
            .map(|entity| entity.name.clone())
            .collect();
        entities.sort();

        let relationships = graph_state
            .relationship_edges
            .iter()
            .filter_map(|edge| {
                let from = graph_state.entities.get(key_of(&edge.from))?;
                let to = graph_state.entities.get(key_of(&edge.to))?;
                Some((from.name.clone(), to.name.clone(), edge.rel_type.clone()))
            })
            .collect();

        GraphSnapshot {
            chunks: graph_state
                .sources
                .values()
                .map(|chunk| {
                    (
                        chunk.file_id.clone(),
                        chunk.chunk_index,
                        chunk.chunk_labels.clone(),
                    )
                })
                .collect(),
            entities,
            source_edges: graph_state.source_edges.len(),
            relationships,
            relationship_edges: graph_state.relationship_edges.len(),
        }
    }

    /// Type and embedding presence recorded for entity `name`, if stored.
    pub fn entity(&self, graph: &str, name: &str) -> Option<(String, bool)> {
        let state = self.state.lock().ok()?;
        let entity = state.graphs.get(graph)?.entities.get(&entity_key(name))?;
        Some((entity.entity_type.clone(), entity.embedding.is_some()))
    }

    fn with_graph<T>(
        &self,
        graph: &str,
        apply: impl FnOnce(&mut GraphState) -> T,
    ) -> Result<T, GraphStoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GraphStoreError::Unavailable("in-memory store poisoned".into()))?;
        Ok(apply(state.graphs.entry(graph.to_string()).or_default()))
    }

    fn retraction_step<T>(
        &self,
        graph: &str,
        step: u8,
        apply: impl FnOnce(&mut GraphState) -> T,
    ) -> Result<T, GraphStoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GraphStoreError::Unavailable("in-memory store poisoned".into()))?;
        if state.fail_retraction_step == Some(step) {
            return Err(GraphStoreError::Unavailable(format!("retraction step {step} rejected")));
        }
        Ok(apply(state.graphs.entry(graph.to_string()).or_default()))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ensure_graph(&self, graph: &str) -> Result<(), GraphStoreError> {
        self.with_graph(graph, |_| ())
    }

    async fn commit(
        &self,
        graph: &str,
        document: &GraphDocument,
        options: &CommitOptions,
    ) -> Result<(), GraphStoreError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| GraphStoreError::Unavailable("in-memory store poisoned".into()))?;
        if let Some(limit) = state.fail_after
            && state.commits >= limit
        {
            return Err(GraphStoreError::Unavailable(format!(
                "commit rejected for chunk {}",
                document.source.chunk_index
            )));
        }
        state.commits += 1;

        let graph_state = state.graphs.entry(graph.to_string()).or_default();
        let chunk_id = source_id(graph, &document.source.key());
        if options.include_source {
            graph_state
                .sources
                .insert(chunk_id.clone(), document.source.clone());
        }

        for node in &document.nodes {
            let key = entity_key(&node.id);
            let entry = graph_state
                .entities
                .entry(key.clone())
                .or_insert_with(|| StoredEntity {
                    name: node.id.clone(),
                    entity_type: node.node_type.clone(),
                    properties: Map::new(),
                    embedding: None,
                    claims: BTreeSet::new(),
                });
            for (name, value) in &node.properties {
                entry.properties.insert(name.clone(), value.clone());
            }
            if node.embedding.is_some() {
                entry.embedding = node.embedding.clone();
            }

            if options.include_source {
                let edge = SourceEdge {
                    from: entity_id(graph, &key),
                    to: chunk_id.clone(),
                };
                if !graph_state.source_edges.contains(&edge) {
                    graph_state.source_edges.push(edge);
                }
            } else {
                entry.claims.insert(document.source.file_id.clone());
            }
        }

        for relationship in &document.relationships {
            let edge = RelationshipEdge {
                from: entity_id(graph, &entity_key(&relationship.source)),
                to: entity_id(graph, &entity_key(&relationship.target)),
                rel_type: relationship.rel_type.clone(),
            };
            if !graph_state.relationship_edges.contains(&edge) {
                graph_state.relationship_edges.push(edge);
            }
        }
        Ok(())
    }

    async fn chunk_ids_for_file(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<Vec<String>, GraphStoreError> {
        self.retraction_step(graph, 1, |state| {
            state
                .sources
                .iter()
                .filter(|(_, chunk)| chunk.file_id == file_id)
                .map(|(id, _)| id.clone())
                .collect()
        })
    }

    async fn delete_chunks(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<u64, GraphStoreError> {
        self.retraction_step(graph, 2, |state| {
            chunk_ids
                .iter()
                .filter(|id| state.sources.remove(id.as_str()).is_some())
                .count() as u64
        })
    }

    async fn delete_source_edges_to(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<u64, GraphStoreError> {
        let targets: HashSet<&str> = chunk_ids.iter().map(String::as_str).collect();
        self.retraction_step(graph, 3, |state| {
            let before = state.source_edges.len();
            state
                .source_edges
                .retain(|edge| !targets.contains(edge.to.as_str()));
            (before - state.source_edges.len()) as u64
        })
    }

    async fn delete_orphan_entities(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<u64, GraphStoreError> {
        self.retraction_step(graph, 4, |state| {
            for entity in state.entities.values_mut() {
                entity.claims.remove(file_id);
            }
            let sourced: HashSet<&str> = state
                .source_edges
                .iter()
                .map(|edge| key_of(&edge.from))
                .collect();
            let orphans: Vec<String> = state
                .entities
                .iter()
                .filter(|(key, entity)| {
                    !sourced.contains(key.as_str()) && entity.claims.is_empty()
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &orphans {
                state.entities.remove(key);
            }
            orphans.len() as u64
        })
    }

    async fn delete_dangling_source_edges(&self, graph: &str) -> Result<u64, GraphStoreError> {
        self.retraction_step(graph, 5, |state| {
            let before = state.source_edges.len();
            let GraphState {
                sources,
                entities,
                source_edges,
                ..
            } = state;
            source_edges.retain(|edge| {
                entities.contains_key(key_of(&edge.from)) && sources.contains_key(&edge.to)
            });
            (before - source_edges.len()) as u64
        })
    }

    async fn delete_dangling_relationship_edges(
        &self,
        graph: &str,
    ) -> Result<u64, GraphStoreError> {
        self.retraction_step(graph, 6, |state| {
            let before = state.relationship_edges.len();
            let GraphState {
                entities,
                relationship_edges,
                ..
            } = state;
            relationship_edges.retain(|edge| {
                entities.contains_key(key_of(&edge.from)) && entities.contains_key(key_of(&edge.to))
            });
            (before - relationship_edges.len()) as u64
        })
    }
}
