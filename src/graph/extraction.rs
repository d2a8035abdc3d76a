//! Entity and relationship extraction from chunk text.

use crate::graph::types::{GraphNode, GraphRelationship};
use crate::llm::{CompletionClient, CompletionError, CompletionRequest, strip_code_fence};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while extracting graph structure from text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Completion backend failed.
    #[error(transparent)]
    Completion(#[from] CompletionError),
    /// Model output was not the expected JSON shape.
    #[error("Extractor returned malformed output: {0}")]
    Malformed(String),
}

/// Constraints on what the extractor may emit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSchema {
    /// Node types to keep; empty keeps all.
    pub allowed_node_types: Vec<String>,
    /// Relationship types to keep; empty keeps all.
    pub allowed_edge_types: Vec<String>,
    /// Node property names to request and keep.
    pub node_properties: Vec<String>,
    /// Relationship property names to request and keep.
    pub edge_properties: Vec<String>,
}

/// Entities and relationships found in one chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedGraph {
    /// Extracted entities.
    pub nodes: Vec<GraphNode>,
    /// Extracted relationships.
    pub relationships: Vec<GraphRelationship>,
}

/// Capability turning chunk text into graph structure.
#[async_trait]
pub trait GraphExtractor: Send + Sync {
    /// Extract entities and relationships from `text`.
    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedGraph, ExtractionError>;
}

const EXTRACTION_SYSTEM_PROMPT: &str = "You are a knowledge graph builder. Identify the entities \
mentioned in the text and the relationships between them. Use the most complete name for each \
entity and reuse it consistently. Respond with a single JSON object of the form \
{\"nodes\": [{\"id\": \"...\", \"type\": \"...\", \"properties\": {}}], \
\"relationships\": [{\"source\": \"...\", \"target\": \"...\", \"type\": \"...\", \
\"properties\": {}}]} and nothing else.";

/// Extractor prompting a completion backend for a JSON graph.
pub struct LlmGraphExtractor {
    client: Arc<dyn CompletionClient>,
}

impl LlmGraphExtractor {
    /// Wrap a completion client.
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn prompt(text: &str, schema: &ExtractionSchema) -> String {
        let mut prompt = String::new();
        if !schema.allowed_node_types.is_empty() {
            prompt.push_str(&format!(
                "Allowed node types: {}\n",
                schema.allowed_node_types.join(", ")
            ));
        }
        if !schema.allowed_edge_types.is_empty() {
            prompt.push_str(&format!(
                "Allowed relationship types: {}\n",
                schema.allowed_edge_types.join(", ")
            ));
        }
        if !schema.node_properties.is_empty() {
            prompt.push_str(&format!(
                "Node properties to fill when known: {}\n",
                schema.node_properties.join(", ")
            ));
        }
        if !schema.edge_properties.is_empty() {
            prompt.push_str(&format!(
                "Relationship properties to fill when known: {}\n",
                schema.edge_properties.join(", ")
            ));
        }
        prompt.push_str("Text:\n");
        prompt.push_str(text);
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    id: Value,
    #[serde(rename = "type", default)]
    node_type: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    source: Value,
    target: Value,
    #[serde(rename = "type", default)]
    rel_type: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

fn value_to_name(value: &Value) -> Option<String> {
    let name = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        // Some models nest the endpoint as a full node object.
        Value::Object(map) => return map.get("id").and_then(value_to_name),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}

fn keep_properties(properties: Map<String, Value>, wanted: &[String]) -> Map<String, Value> {
    if wanted.is_empty() {
        return properties;
    }
    properties
        .into_iter()
        .filter(|(name, _)| wanted.iter().any(|w| w == name))
        .collect()
}

fn is_allowed(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|item| item.eq_ignore_ascii_case(value))
}

/// Parse model output into an [`ExtractedGraph`], enforcing the schema's type filters.
pub fn parse_extraction(
    raw: &str,
    schema: &ExtractionSchema,
) -> Result<ExtractedGraph, ExtractionError> {
    let parsed: RawGraph = serde_json::from_str(strip_code_fence(raw))
        .map_err(|error| ExtractionError::Malformed(error.to_string()))?;

    let nodes: Vec<GraphNode> = parsed
        .nodes
        .into_iter()
        .filter_map(|node| {
            let id = value_to_name(&node.id)?;
            let node_type = node.node_type.unwrap_or_else(|| "Entity".to_string());
            is_allowed(&schema.allowed_node_types, &node_type).then(|| GraphNode {
                id,
                node_type,
                properties: keep_properties(node.properties, &schema.node_properties),
                embedding: None,
            })
        })
        .collect();

    let relationships = parsed
        .relationships
        .into_iter()
        .filter_map(|rel| {
            let source = value_to_name(&rel.source)?;
            let target = value_to_name(&rel.target)?;
            let rel_type = rel.rel_type.unwrap_or_else(|| "RELATED_TO".to_string());
            let endpoints_kept = nodes.iter().any(|n| n.id == source)
                && nodes.iter().any(|n| n.id == target);
            (is_allowed(&schema.allowed_edge_types, &rel_type) && endpoints_kept).then(|| {
                GraphRelationship {
                    source,
                    target,
                    rel_type,
                    properties: keep_properties(rel.properties, &schema.edge_properties),
                    embedding: None,
                }
            })
        })
        .collect();

    Ok(ExtractedGraph {
        nodes,
        relationships,
    })
}

#[async_trait]
impl GraphExtractor for LlmGraphExtractor {
    async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<ExtractedGraph, ExtractionError> {
        let raw = self
            .client
            .complete(CompletionRequest {
                system: EXTRACTION_SYSTEM_PROMPT.to_string(),
                prompt: Self::prompt(text, schema),
            })
            .await?;
        parse_extraction(&raw, schema)
    }
}
