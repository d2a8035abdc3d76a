#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use graphprep::config::{
    Config, DEFAULT_LABEL_SELECTOR_PROMPT, EmbeddingConfig, EmbeddingProvider, GraphStoreConfig,
    GuardrailConfig, IngestDefaults, LabellingConfig, LabellingStrategy, LlmConfig, LlmProvider,
};
use graphprep::graph::{
    ExtractedGraph, ExtractionError, ExtractionSchema, GraphExtractor, GraphNode,
    GraphRelationship,
};
use graphprep::guardrail::{GuardrailClient, GuardrailClientError, GuardrailVerdict};
use graphprep::llm::{CompletionClient, CompletionError, CompletionRequest};
use graphprep::loader::{DocumentLoader, LoadError, LoadedDocument};
use serde_json::Map;

pub const GRAPH: &str = "SCENARIO";

/// Configuration with no remote services and the two reference labels.
pub fn offline_config() -> Config {
    Config {
        graph: GraphStoreConfig {
            url: "http://127.0.0.1:8529".into(),
            database: "_system".into(),
            username: "root".into(),
            password: None,
            default_graph_name: GRAPH.into(),
            insert_async: false,
            batch_size: 100,
        },
        llm: LlmConfig {
            provider: LlmProvider::OpenAI,
            endpoint: "http://127.0.0.1:80".into(),
            api_key: None,
            model: "offline".into(),
            temperature: 0.0,
            timeout: Duration::from_secs(5),
            extraction_enabled: false,
        },
        embedding: EmbeddingConfig {
            provider: EmbeddingProvider::Hashing,
            endpoint: None,
            api_key: None,
            model: "hashing".into(),
            dimension: 32,
        },
        guardrail: GuardrailConfig {
            enabled: false,
            url: "http://127.0.0.1:9090/v1/guardrails".into(),
            timeout: Duration::from_secs(1),
        },
        labelling: LabellingConfig {
            strategy: LabellingStrategy::Bm25,
            directory_url: None,
            directory_token: None,
            static_labels: vec!["green energy".into(), "business".into()],
            bm25_threshold: 2.0,
            embedding_threshold: 0.75,
            llm_system_prompt: DEFAULT_LABEL_SELECTOR_PROMPT.into(),
            llm_concurrency: 2,
        },
        ingest_defaults: IngestDefaults {
            embed_nodes: false,
            embed_edges: false,
            embed_chunks: false,
            allowed_node_types: Vec::new(),
            allowed_edge_types: Vec::new(),
            node_properties: Vec::new(),
            edge_properties: Vec::new(),
            text_capitalization_strategy: "upper".into(),
            include_chunks: true,
        },
        server_port: None,
    }
}

/// Loader returning the same records regardless of path.
pub struct RecordLoader(pub Vec<String>);

impl RecordLoader {
    pub fn new(records: &[&str]) -> Arc<Self> {
        Arc::new(Self(records.iter().map(|record| record.to_string()).collect()))
    }
}

#[async_trait]
impl DocumentLoader for RecordLoader {
    async fn load(&self, _path: &Path) -> Result<LoadedDocument, LoadError> {
        Ok(LoadedDocument::Records(self.0.clone()))
    }
}

/// Guardrail flagging chunks containing `needle`, counting every check.
pub struct NeedleGuardrail {
    pub needle: &'static str,
    pub checks: AtomicUsize,
}

impl NeedleGuardrail {
    pub fn new(needle: &'static str) -> Arc<Self> {
        Arc::new(Self {
            needle,
            checks: AtomicUsize::new(0),
        })
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuardrailClient for NeedleGuardrail {
    async fn check(&self, text: &str) -> Result<GuardrailVerdict, GuardrailClientError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if text.contains(self.needle) {
            Ok(GuardrailVerdict::Unsafe(None))
        } else {
            Ok(GuardrailVerdict::Safe)
        }
    }
}

/// Completion client answering every prompt with the same text, counting calls.
pub struct FixedCompletion {
    pub response: &'static str,
    pub calls: AtomicUsize,
}

impl FixedCompletion {
    pub fn new(response: &'static str) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for FixedCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.to_string())
    }
}

/// Extractor recognising a fixed vocabulary of organisation names, linking them in order.
pub struct VocabularyExtractor(pub Vec<&'static str>);

#[async_trait]
impl GraphExtractor for VocabularyExtractor {
    async fn extract(
        &self,
        text: &str,
        _schema: &ExtractionSchema,
    ) -> Result<ExtractedGraph, ExtractionError> {
        let found: Vec<&str> = self
            .0
            .iter()
            .copied()
            .filter(|name| text.contains(name))
            .collect();
        Ok(ExtractedGraph {
            nodes: found
                .iter()
                .map(|name| GraphNode {
                    id: (*name).to_string(),
                    node_type: "Organization".into(),
                    properties: Map::new(),
                    embedding: None,
                })
                .collect(),
            relationships: found
                .windows(2)
                .map(|pair| GraphRelationship {
                    source: pair[0].to_string(),
                    target: pair[1].to_string(),
                    rel_type: "WORKS_WITH".into(),
                    properties: Map::new(),
                    embedding: None,
                })
                .collect(),
        })
    }
}
