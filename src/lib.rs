#![deny(missing_docs)]

//! Core library for graphprep: document ingestion into a label-annotated knowledge graph with
//! cascading retraction.

/// HTTP routing and REST handlers.
pub mod api;
/// ArangoDB HTTP integration.
pub mod arango;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Graph data model, store capability, and entity extraction.
pub mod graph;
/// Guardrail classifier client.
pub mod guardrail;
/// Label directory clients.
pub mod labels;
/// Text-generation clients.
pub mod llm;
/// Source document loaders.
pub mod loader;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// Ingestion pipeline and retraction engine.
pub mod processing;
