use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion service.
///
/// Built once near process start and shared by reference; nothing reads the environment after
/// [`Config::from_env`] returns.
#[derive(Debug, Clone)]
pub struct Config {
    /// Graph store connection and write defaults.
    pub graph: GraphStoreConfig,
    /// Text-generation backend used for labelling and entity extraction.
    pub llm: LlmConfig,
    /// Embedding backend used for embedding labelling and node/edge/chunk vectors.
    pub embedding: EmbeddingConfig,
    /// Safety classifier gate.
    pub guardrail: GuardrailConfig,
    /// Label directory and labelling strategy selection.
    pub labelling: LabellingConfig,
    /// Defaults applied to ingestion request fields the caller omits.
    pub ingest_defaults: IngestDefaults,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// ArangoDB connection settings.
#[derive(Debug, Clone)]
pub struct GraphStoreConfig {
    /// Base URL of the ArangoDB HTTP endpoint.
    pub url: String,
    /// Database holding the graphs.
    pub database: String,
    /// Basic-auth user name.
    pub username: String,
    /// Basic-auth password, if any.
    pub password: Option<String>,
    /// Graph used when a request does not name one.
    pub default_graph_name: String,
    /// Whether writes are sent fire-and-forget by default.
    pub insert_async: bool,
    /// Default batch size for entity and edge inserts.
    pub batch_size: usize,
}

/// Wire protocol spoken by the text-generation backend.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions (vLLM, TGI, OpenAI).
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Text-generation backend settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Protocol used to reach the backend.
    pub provider: LlmProvider,
    /// Base URL of the backend.
    pub endpoint: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier passed with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// When false, graph writes skip extraction and commit source-only documents.
    pub extraction_enabled: bool,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible `/v1/embeddings` endpoint (OpenAI, TEI).
    OpenAI,
    /// Deterministic in-process hashing embeddings.
    Hashing,
}

/// Embedding backend settings.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Backend used to produce vectors.
    pub provider: EmbeddingProvider,
    /// Base URL for remote providers.
    pub endpoint: Option<String>,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Model identifier passed to the provider.
    pub model: String,
    /// Dimensionality of the produced vectors.
    pub dimension: usize,
}

/// Guardrail gate settings.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    /// When false the gate is a pass-through.
    pub enabled: bool,
    /// Guardrail service endpoint.
    pub url: String,
    /// Timeout applied to each per-chunk check.
    pub timeout: Duration,
}

/// Labelling strategies selectable at runtime.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LabellingStrategy {
    /// Lexical BM25 scoring against label names.
    Bm25,
    /// Cosine similarity between label and chunk embeddings.
    Embedding,
    /// LLM classification constrained to the label directory.
    Llm,
}

/// Label directory and labelling engine settings.
#[derive(Debug, Clone)]
pub struct LabellingConfig {
    /// Strategy used for every ingestion.
    pub strategy: LabellingStrategy,
    /// Remote label directory base URL; when absent `static_labels` is used.
    pub directory_url: Option<String>,
    /// Bearer token presented to the label directory.
    pub directory_token: Option<String>,
    /// Label names used when no remote directory is configured.
    pub static_labels: Vec<String>,
    /// Minimum BM25 score for a label to be assigned.
    pub bm25_threshold: f64,
    /// Minimum cosine similarity for a label to be assigned.
    pub embedding_threshold: f32,
    /// System prompt given to the LLM label selector.
    pub llm_system_prompt: String,
    /// Maximum number of concurrent LLM classification calls.
    pub llm_concurrency: usize,
}

/// Defaults for optional ingestion request fields.
#[derive(Debug, Clone)]
pub struct IngestDefaults {
    /// Embed extracted entity nodes.
    pub embed_nodes: bool,
    /// Embed extracted relationships.
    pub embed_edges: bool,
    /// Embed source chunk nodes.
    pub embed_chunks: bool,
    /// Node types the extractor may emit; empty means unrestricted.
    pub allowed_node_types: Vec<String>,
    /// Edge types the extractor may emit; empty means unrestricted.
    pub allowed_edge_types: Vec<String>,
    /// Node properties requested from the extractor.
    pub node_properties: Vec<String>,
    /// Edge properties requested from the extractor.
    pub edge_properties: Vec<String>,
    /// Raw capitalization strategy string, validated per request.
    pub text_capitalization_strategy: String,
    /// Commit source chunk nodes alongside extracted entities.
    pub include_chunks: bool,
}

/// Prompt used when `LABEL_SELECTOR_SYSTEM_PROMPT` is not set.
pub const DEFAULT_LABEL_SELECTOR_PROMPT: &str = r#"<SYSTEM INSTRUCTIONS>
Select the relevant labels from the provided list that best match the content of the input text.
Use only the exact labels from the list. Return an empty list if none fit.
Output must strictly follow the given JSON format.
</SYSTEM INSTRUCTIONS>
<EXAMPLE>
Input: "The car has a hydrogen engine that uses a novel technology."
Labels: ["sports", "innovation", "green energy", "business"]
Output: {"labels": ["green energy", "innovation"]}
</EXAMPLE>"#;

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            graph: GraphStoreConfig {
                url: load_env_or("ARANGO_URL", "http://localhost:8529"),
                database: load_env_or("ARANGO_DB_NAME", "_system"),
                username: load_env_or("ARANGO_USERNAME", "root"),
                password: load_env_optional("ARANGO_PASSWORD"),
                default_graph_name: load_env_or("ARANGO_GRAPH_NAME", "GRAPH_TEST"),
                insert_async: parse_env_or("ARANGO_INSERT_ASYNC", false)?,
                batch_size: parse_env_or("ARANGO_BATCH_SIZE", 1000)?,
            },
            llm: LlmConfig {
                provider: load_env_or("LLM_PROVIDER", "openai")
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("LLM_PROVIDER".into()))?,
                endpoint: load_env_or("LLM_ENDPOINT", "http://localhost:80"),
                api_key: load_env_optional("LLM_API_KEY"),
                model: load_env_or("LLM_MODEL", "Intel/neural-chat-7b-v3-3"),
                temperature: parse_env_or("LLM_TEMPERATURE", 0.0)?,
                timeout: Duration::from_secs(parse_env_or("LLM_TIMEOUT_SECS", 600)?),
                extraction_enabled: parse_env_or("GRAPH_EXTRACTION_ENABLED", true)?,
            },
            embedding: EmbeddingConfig {
                provider: load_env_or("EMBEDDING_PROVIDER", "hashing")
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))?,
                endpoint: load_env_optional("EMBEDDING_ENDPOINT"),
                api_key: load_env_optional("EMBEDDING_API_KEY"),
                model: load_env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                dimension: parse_env_or("EMBEDDING_DIMENSION", 512)?,
            },
            guardrail: GuardrailConfig {
                enabled: parse_env_or("GUARDRAIL_ENABLED", false)?,
                url: load_env_or("GUARDRAIL_URL", "http://guardrail:9090/v1/guardrails"),
                timeout: Duration::from_secs(parse_env_or("GUARDRAIL_TIMEOUT_SECS", 30)?),
            },
            labelling: LabellingConfig {
                strategy: load_env_or("LABELING_STRATEGY", "bm25")
                    .parse()
                    .map_err(|()| ConfigError::InvalidValue("LABELING_STRATEGY".into()))?,
                directory_url: load_env_optional("LABEL_DIRECTORY_URL"),
                directory_token: load_env_optional("LABEL_DIRECTORY_TOKEN"),
                static_labels: load_list("STATIC_LABELS", &[]),
                bm25_threshold: parse_env_or("BM25_LABEL_THRESHOLD", 2.0)?,
                embedding_threshold: parse_env_or("EMBEDDING_LABEL_THRESHOLD", 0.75)?,
                llm_system_prompt: load_env_or(
                    "LABEL_SELECTOR_SYSTEM_PROMPT",
                    DEFAULT_LABEL_SELECTOR_PROMPT,
                ),
                llm_concurrency: parse_env_or::<usize>("LLM_LABEL_CONCURRENCY", 4)?.max(1),
            },
            ingest_defaults: IngestDefaults {
                embed_nodes: parse_env_or("EMBED_NODES", true)?,
                embed_edges: parse_env_or("EMBED_EDGES", true)?,
                embed_chunks: parse_env_or("EMBED_CHUNKS", true)?,
                allowed_node_types: load_list("ALLOWED_NODE_TYPES", &[]),
                allowed_edge_types: load_list("ALLOWED_EDGE_TYPES", &[]),
                node_properties: load_list("NODE_PROPERTIES", &["description"]),
                edge_properties: load_list("EDGE_PROPERTIES", &["description"]),
                text_capitalization_strategy: load_env_or("TEXT_CAPITALIZATION_STRATEGY", "upper"),
                include_chunks: parse_env_or("INCLUDE_CHUNKS", true)?,
            },
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Load `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            arango_url = %config.graph.url,
            database = %config.graph.database,
            graph = %config.graph.default_graph_name,
            llm_provider = ?config.llm.provider,
            embedding_provider = ?config.embedding.provider,
            labelling = ?config.labelling.strategy,
            guardrail_enabled = config.guardrail.enabled,
            server_port = ?config.server_port,
            "Loaded configuration"
        );
        Ok(config)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => parse_value(key, value.trim()),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    // Booleans arrive as "True"/"FALSE" from compose files as often as lowercase.
    let normalized = value.to_ascii_lowercase();
    normalized
        .parse()
        .or_else(|_| value.parse())
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn load_list(key: &str, default: &[&str]) -> Vec<String> {
    match load_env_optional(key) {
        Some(value) => split_list(&value),
        None => default.iter().map(|item| item.to_string()).collect(),
    }
}

/// Split a comma separated list, trimming entries and dropping empties.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "vllm" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "tei" => Ok(Self::OpenAI),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LabellingStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bm25" => Ok(Self::Bm25),
            "embedding" => Ok(Self::Embedding),
            "llm" => Ok(Self::Llm),
            _ => Err(()),
        }
    }
}
