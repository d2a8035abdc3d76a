//! Graph data model, store capability, and entity extraction.

pub mod extraction;
pub mod memory;
pub mod store;
pub mod types;

pub use extraction::{
    ExtractedGraph, ExtractionError, ExtractionSchema, GraphExtractor, LlmGraphExtractor,
};
pub use memory::{GraphSnapshot, InMemoryGraphStore};
pub use store::{CommitOptions, GraphStore, GraphStoreError, validate_graph_name};
pub use types::{
    GraphDocument, GraphNode, GraphRelationship, SourceChunk, TextCapitalization, entity_key,
    source_key,
};
