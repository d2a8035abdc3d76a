//! Capability interface over the backing graph database.

use crate::arango::ArangoError;
use crate::graph::types::GraphDocument;
use async_trait::async_trait;
use thiserror::Error;

const MAX_GRAPH_NAME_LEN: usize = 64;

/// Errors surfaced by graph store implementations.
#[derive(Debug, Error)]
pub enum GraphStoreError {
    /// Graph name contains characters that cannot be used in collection names.
    #[error("Invalid graph name: {0:?}")]
    InvalidGraphName(String),
    /// ArangoDB rejected or failed a request.
    #[error(transparent)]
    Arango(#[from] ArangoError),
    /// Store could not complete the operation for another reason.
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),
}

/// Write options applied to a single commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    /// Maximum number of documents per insert statement.
    pub batch_size: usize,
    /// Return before the store has applied the write.
    pub insert_async: bool,
    /// Store the source chunk node and the sourcing edges pointing at it. Without them the
    /// document's entities carry its `file_id` as a claim so retraction can still account for
    /// them.
    pub include_source: bool,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            insert_async: false,
            include_source: true,
        }
    }
}

/// Node and edge operations required by ingestion and retraction.
///
/// Chunk nodes live in the graph's source collection and are tagged with `file_id`. Sourcing
/// edges run from entity to chunk; relationship edges run from entity to entity. Retraction
/// primitives are listed in the order the retraction steps call them.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the graph's collections when they do not exist yet.
    async fn ensure_graph(&self, graph: &str) -> Result<(), GraphStoreError>;

    /// Persist one chunk's graph document.
    async fn commit(
        &self,
        graph: &str,
        document: &GraphDocument,
        options: &CommitOptions,
    ) -> Result<(), GraphStoreError>;

    /// Identifiers of every chunk node tagged with `file_id`.
    async fn chunk_ids_for_file(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<Vec<String>, GraphStoreError>;

    /// Delete the given chunk nodes; returns how many were removed.
    async fn delete_chunks(&self, graph: &str, chunk_ids: &[String])
    -> Result<u64, GraphStoreError>;

    /// Delete sourcing edges whose target is one of `chunk_ids`.
    async fn delete_source_edges_to(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<u64, GraphStoreError>;

    /// Drop `file_id` from the claims of entities committed without a source node, then delete
    /// every entity left with neither an outgoing sourcing edge nor a remaining claim.
    async fn delete_orphan_entities(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<u64, GraphStoreError>;

    /// Delete sourcing edges with an endpoint that no longer resolves.
    async fn delete_dangling_source_edges(&self, graph: &str) -> Result<u64, GraphStoreError>;

    /// Delete relationship edges with an entity endpoint that no longer resolves.
    async fn delete_dangling_relationship_edges(
        &self,
        graph: &str,
    ) -> Result<u64, GraphStoreError>;
}

/// Reject graph names that are empty, too long, or contain characters outside `[A-Za-z0-9_-]`.
pub fn validate_graph_name(name: &str) -> Result<(), GraphStoreError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_GRAPH_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(GraphStoreError::InvalidGraphName(name.to_string()))
    }
}
