//! Request, response, and error types for the ingestion pipeline.

use crate::config::Config;
use crate::graph::{CommitOptions, ExtractionSchema, GraphStoreError, TextCapitalization};
use crate::labels::LabelDirectoryError;
use crate::loader::LoadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use super::writer::WriteSettings;

/// Default chunk budget in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1500;
/// Default overlap between adjacent chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_table_strategy() -> String {
    "fast".to_string()
}

/// Errors produced while turning a loaded document into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Request asked for an impossible chunk budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Splitting produced no chunks.
    #[error("document produced zero chunks")]
    NoChunks,
}

/// Stage of the ingestion state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Reading the source document.
    Loading,
    /// Splitting into chunks.
    Chunking,
    /// Rejecting garbled documents.
    Validating,
    /// Running the safety gate.
    GuardrailChecking,
    /// Assigning labels.
    Labelling,
    /// Extracting and committing graph documents.
    Writing,
    /// Finished successfully.
    Done,
    /// Aborted.
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loading => "loading",
            Self::Chunking => "chunking",
            Self::Validating => "validating",
            Self::GuardrailChecking => "guardrail_checking",
            Self::Labelling => "labelling",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A retraction step failed.
#[derive(Debug, Error)]
#[error("retraction step {step} failed: {source}")]
pub struct RetractionError {
    /// One-based step number that failed.
    pub step: u8,
    /// Store error raised by the step.
    #[source]
    pub source: GraphStoreError,
}

/// Reasons an ingestion aborts.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Request fields were unusable.
    #[error("Invalid ingestion request: {0}")]
    InvalidRequest(String),
    /// Source was missing, unreadable, or empty.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoadError),
    /// Chunking produced nothing usable.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Too few chunks looked like readable text.
    #[error("Document failed content validation: {valid} of {total} chunks valid")]
    Validation {
        /// Chunks that passed the heuristic.
        valid: usize,
        /// Chunks inspected.
        total: usize,
    },
    /// The guardrail stopped the document.
    #[error("{reason} at chunk {chunk_index}")]
    GuardrailViolation {
        /// Index of the first failing chunk.
        chunk_index: usize,
        /// Failure reason.
        reason: String,
    },
    /// The label directory could not be fetched.
    #[error("Failed to fetch label directory: {0}")]
    LabelDirectory(#[from] LabelDirectoryError),
    /// Committing to the graph failed.
    #[error("{}", graph_write_message(*chunk_index, source, compensation.as_ref()))]
    GraphWrite {
        /// Chunk whose commit failed; `None` when the graph could not be prepared.
        chunk_index: Option<usize>,
        /// Store error.
        #[source]
        source: GraphStoreError,
        /// Error raised by the compensating retraction, if it also failed.
        compensation: Option<RetractionError>,
    },
    /// A retraction request failed.
    #[error("Data retraction failed: {0}")]
    Retraction(#[from] RetractionError),
}

fn graph_write_message(
    chunk_index: Option<usize>,
    source: &GraphStoreError,
    compensation: Option<&RetractionError>,
) -> String {
    let mut message = match chunk_index {
        Some(index) => format!("Graph write failed at chunk {index}: {source}"),
        None => format!("Graph preparation failed: {source}"),
    };
    if let Some(compensation) = compensation {
        message.push_str(&format!("; compensating retraction also failed: {compensation}"));
    }
    message
}

impl IngestionError {
    /// Stage in which this error is raised.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::InvalidRequest(_) | Self::Load(_) => PipelineStage::Loading,
            Self::Chunking(_) => PipelineStage::Chunking,
            Self::Validation { .. } => PipelineStage::Validating,
            Self::GuardrailViolation { .. } => PipelineStage::GuardrailChecking,
            Self::LabelDirectory(_) => PipelineStage::Labelling,
            Self::GraphWrite { .. } | Self::Retraction(_) => PipelineStage::Writing,
        }
    }

    /// Chunk index associated with the failure, when one is meaningful.
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            Self::GuardrailViolation { chunk_index, .. } => Some(*chunk_index),
            Self::GraphWrite { chunk_index, .. } => *chunk_index,
            _ => None,
        }
    }
}

/// Ingestion request as received from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    /// Identifier tagging every chunk of this document; retraction key.
    pub file_id: String,
    /// Display name of the file.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Storage location recorded on chunk nodes; defaults to `file_path`.
    #[serde(default)]
    pub storage_path: Option<String>,
    /// Local path the document is loaded from.
    pub file_path: PathBuf,
    /// Chunk budget in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Append extracted tables for PDF sources.
    #[serde(default)]
    pub process_table: bool,
    /// Table extraction strategy name.
    #[serde(default = "default_table_strategy")]
    pub table_strategy: String,
    /// Target graph; defaults to the configured graph.
    #[serde(default)]
    pub graph_name: Option<String>,
    /// Fire-and-forget writes.
    #[serde(default)]
    pub insert_async: Option<bool>,
    /// Documents per insert statement.
    #[serde(default)]
    pub insert_batch_size: Option<usize>,
    /// Embed entity nodes.
    #[serde(default)]
    pub embed_nodes: Option<bool>,
    /// Embed relationships.
    #[serde(default)]
    pub embed_edges: Option<bool>,
    /// Embed chunk nodes.
    #[serde(default)]
    pub embed_chunks: Option<bool>,
    /// Node types the extractor may emit.
    #[serde(default)]
    pub allowed_node_types: Option<Vec<String>>,
    /// Relationship types the extractor may emit.
    #[serde(default)]
    pub allowed_edge_types: Option<Vec<String>>,
    /// Node properties to extract.
    #[serde(default)]
    pub node_properties: Option<Vec<String>>,
    /// Relationship properties to extract.
    #[serde(default)]
    pub edge_properties: Option<Vec<String>>,
    /// `lower`, `upper`, or `none`; anything else means `upper`.
    #[serde(default)]
    pub text_capitalization_strategy: Option<String>,
    /// Store chunk nodes and sourcing edges.
    #[serde(default)]
    pub include_chunks: Option<bool>,
}

impl IngestRequest {
    /// Request with every optional field left to its default.
    pub fn new(file_id: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: None,
            storage_path: None,
            file_path: file_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            process_table: false,
            table_strategy: default_table_strategy(),
            graph_name: None,
            insert_async: None,
            insert_batch_size: None,
            embed_nodes: None,
            embed_edges: None,
            embed_chunks: None,
            allowed_node_types: None,
            allowed_edge_types: None,
            node_properties: None,
            edge_properties: None,
            text_capitalization_strategy: None,
            include_chunks: None,
        }
    }

    /// Apply configuration defaults to every omitted field.
    pub fn resolve(self, config: &Config) -> IngestPlan {
        let defaults = &config.ingest_defaults;
        let storage_path = self
            .storage_path
            .unwrap_or_else(|| self.file_path.display().to_string());
        let capitalization = TextCapitalization::parse_lenient(
            self.text_capitalization_strategy
                .as_deref()
                .unwrap_or(&defaults.text_capitalization_strategy),
        );

        IngestPlan {
            file_id: self.file_id,
            storage_path,
            file_path: self.file_path,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            process_table: self.process_table,
            table_strategy: self.table_strategy,
            write: WriteSettings {
                graph_name: self
                    .graph_name
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| config.graph.default_graph_name.clone()),
                commit: CommitOptions {
                    batch_size: self
                        .insert_batch_size
                        .unwrap_or(config.graph.batch_size)
                        .max(1),
                    insert_async: self.insert_async.unwrap_or(config.graph.insert_async),
                    include_source: self.include_chunks.unwrap_or(defaults.include_chunks),
                },
                schema: ExtractionSchema {
                    allowed_node_types: self
                        .allowed_node_types
                        .unwrap_or_else(|| defaults.allowed_node_types.clone()),
                    allowed_edge_types: self
                        .allowed_edge_types
                        .unwrap_or_else(|| defaults.allowed_edge_types.clone()),
                    node_properties: self
                        .node_properties
                        .unwrap_or_else(|| defaults.node_properties.clone()),
                    edge_properties: self
                        .edge_properties
                        .unwrap_or_else(|| defaults.edge_properties.clone()),
                },
                capitalization,
                embed_nodes: self.embed_nodes.unwrap_or(defaults.embed_nodes),
                embed_edges: self.embed_edges.unwrap_or(defaults.embed_edges),
                embed_chunks: self.embed_chunks.unwrap_or(defaults.embed_chunks),
            },
        }
    }
}

/// Ingestion request with every default applied.
#[derive(Debug, Clone)]
pub struct IngestPlan {
    /// Document identifier.
    pub file_id: String,
    /// Storage location recorded on chunk nodes.
    pub storage_path: String,
    /// Local path the document is loaded from.
    pub file_path: PathBuf,
    /// Chunk budget in characters.
    pub chunk_size: usize,
    /// Overlap in characters.
    pub chunk_overlap: usize,
    /// Append extracted tables for PDF sources.
    pub process_table: bool,
    /// Table extraction strategy name.
    pub table_strategy: String,
    /// Graph write settings.
    pub write: WriteSettings,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    /// Document identifier.
    pub file_id: String,
    /// Graph the document was written to.
    pub graph_name: String,
    /// Chunks committed.
    pub chunk_count: usize,
    /// Chunks that fell back to empty labels.
    pub labelling_degraded: usize,
    /// Chunks written without full extraction or embeddings.
    pub extraction_degraded: usize,
}

/// Structured result returned to ingestion callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionResponse {
    /// Whether the document was fully written.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Graph written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_name: Option<String>,
    /// Chunks written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    /// Chunk that caused an abort.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

impl IngestionResponse {
    /// Success response for a completed ingestion.
    pub fn from_report(report: &IngestionReport) -> Self {
        Self {
            success: true,
            message: format!("File ingested with {} chunks.", report.chunk_count),
            graph_name: Some(report.graph_name.clone()),
            chunk_count: Some(report.chunk_count),
            chunk_index: None,
        }
    }

    /// Failure response for an aborted ingestion.
    pub fn from_error(error: &IngestionError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            graph_name: None,
            chunk_count: None,
            chunk_index: error.chunk_index(),
        }
    }
}

/// Retraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractionRequest {
    /// Document whose derived graph state is removed.
    pub file_id: String,
    /// Target graph; defaults to the configured graph.
    #[serde(default)]
    pub graph_name: Option<String>,
}

/// Structured retraction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetractionResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Whether every step completed.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
    /// Identifiers of the chunk nodes removed.
    pub deleted_chunks: Vec<String>,
}

impl RetractionResponse {
    /// Success response listing the removed chunk identifiers.
    pub fn succeeded(file_id: &str, deleted_chunks: Vec<String>) -> Self {
        Self {
            status: 200,
            success: true,
            message: format!("Data retraction succeeded for file_id={file_id}"),
            deleted_chunks,
        }
    }

    /// Failure response for a retraction that could not complete.
    pub fn failed(error: &IngestionError) -> Self {
        Self {
            status: 500,
            success: false,
            message: error.to_string(),
            deleted_chunks: Vec::new(),
        }
    }
}
