//! Ingestion pipeline: load, chunk, validate, guardrail, label, and write, plus the cascading
//! retraction that undoes a document.

pub mod chunking;
pub mod guardrail;
pub mod labelling;
mod locks;
pub mod retraction;
pub mod retry;
mod service;
pub mod types;
pub mod validation;
pub mod writer;

pub use chunking::{DocumentChunker, RecursiveChunker, chunk_document};
pub use guardrail::{GuardrailFailure, GuardrailGate, GuardrailOutcome};
pub use labelling::{LabelAssignment, Labeller, build_labeller};
pub use locks::{FileGuard, FileLocks};
pub use retraction::{RetractionEngine, RetractionOutcome};
pub use service::{
    HealthSnapshot, IngestionApi, IngestionPipeline, IngestionPipelineBuilder, PipelineBuildError,
};
pub use types::{
    ChunkingError, IngestPlan, IngestRequest, IngestionError, IngestionReport, IngestionResponse,
    PipelineStage, RetractionError, RetractionRequest, RetractionResponse,
};
pub use validation::{ValidationSummary, validate_chunks};
pub use writer::{ChunkToWrite, ChunkWriteReport, GraphWriter, WriteSettings};
