//! Node, edge, and chunk structures committed to a named graph.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Entity extracted from chunk text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Entity name as extracted; used to derive the stored key.
    pub id: String,
    /// Entity type such as `Person` or `Organization`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Additional properties requested from the extractor.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Optional embedding of the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Relationship between two extracted entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Entity id at the tail of the edge.
    pub source: String,
    /// Entity id at the head of the edge.
    pub target: String,
    /// Relationship type such as `WORKS_AT`.
    #[serde(rename = "type")]
    pub rel_type: String,
    /// Additional properties requested from the extractor.
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Optional embedding of the relationship description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Source chunk node tagged with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceChunk {
    /// Identifier of the document the chunk belongs to.
    pub file_id: String,
    /// Storage location of the source document.
    pub file_path: String,
    /// Dense zero-based index of the chunk within its document.
    pub chunk_index: usize,
    /// Labels assigned to the chunk; always a subset of the ingestion's label set.
    pub chunk_labels: Vec<String>,
    /// Chunk text.
    pub text: String,
    /// Optional embedding of the chunk text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl SourceChunk {
    /// Deterministic storage key for this chunk.
    pub fn key(&self) -> String {
        source_key(&self.file_id, self.chunk_index)
    }
}

/// Nodes and edges extracted from one chunk, plus the chunk itself.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDocument {
    /// Extracted entities.
    pub nodes: Vec<GraphNode>,
    /// Extracted relationships between entities.
    pub relationships: Vec<GraphRelationship>,
    /// Chunk the structure was extracted from.
    pub source: SourceChunk,
}

impl GraphDocument {
    /// Document carrying only the source chunk, used when extraction fails or is disabled.
    pub fn source_only(source: SourceChunk) -> Self {
        Self {
            nodes: Vec::new(),
            relationships: Vec::new(),
            source,
        }
    }
}

/// Storage key for an entity; identical names converge on one node across documents.
pub fn entity_key(entity_id: &str) -> String {
    hash_hex(entity_id)
}

/// Storage key for a chunk of a document.
pub fn source_key(file_id: &str, chunk_index: usize) -> String {
    hash_hex(&format!("{file_id}:{chunk_index}"))
}

fn hash_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Capitalization applied to extracted entity names and edge endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCapitalization {
    /// Lowercase every name.
    Lower,
    /// Uppercase every name.
    #[default]
    Upper,
    /// Leave names as extracted.
    None,
}

impl TextCapitalization {
    /// Parse a strategy name, falling back to [`TextCapitalization::Upper`] with a warning.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "none" => Self::None,
            other => {
                tracing::warn!(
                    strategy = other,
                    "Invalid text capitalization strategy; defaulting to 'upper'"
                );
                Self::Upper
            }
        }
    }

    /// Apply the strategy to `text`.
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Lower => text.to_lowercase(),
            Self::Upper => text.to_uppercase(),
            Self::None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_capitalization_defaults_to_upper() {
        assert_eq!(TextCapitalization::parse_lenient("LOWER"), TextCapitalization::Lower);
        assert_eq!(TextCapitalization::parse_lenient("none"), TextCapitalization::None);
        assert_eq!(TextCapitalization::parse_lenient("title"), TextCapitalization::Upper);
        assert_eq!(TextCapitalization::Upper.apply("Acme Corp"), "ACME CORP");
    }

    #[test]
    fn keys_are_stable_and_distinct_per_chunk() {
        assert_eq!(source_key("doc-a", 0), source_key("doc-a", 0));
        assert_ne!(source_key("doc-a", 0), source_key("doc-a", 1));
        assert_ne!(source_key("doc-a", 1), source_key("doc-b", 1));
        assert_eq!(entity_key("ACME"), entity_key("ACME"));
        assert_eq!(entity_key("ACME").len(), 64);
    }
}
