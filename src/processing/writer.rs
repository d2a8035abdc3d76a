//! Per-chunk extraction, enrichment, and commit into the named graph.

use crate::embedding::EmbeddingClient;
use crate::graph::{
    CommitOptions, ExtractedGraph, ExtractionSchema, GraphDocument, GraphExtractor, GraphNode,
    GraphStore, GraphStoreError, SourceChunk, TextCapitalization,
};
use std::sync::Arc;

/// Graph settings resolved for one ingestion.
#[derive(Debug, Clone)]
pub struct WriteSettings {
    /// Target graph.
    pub graph_name: String,
    /// Store write options.
    pub commit: CommitOptions,
    /// Type and property constraints passed to the extractor.
    pub schema: ExtractionSchema,
    /// Capitalization applied to entity names.
    pub capitalization: TextCapitalization,
    /// Attach embeddings to entity nodes.
    pub embed_nodes: bool,
    /// Attach embeddings to relationships.
    pub embed_edges: bool,
    /// Attach embeddings to chunk nodes.
    pub embed_chunks: bool,
}

/// One labelled chunk ready to be written.
#[derive(Debug, Clone)]
pub struct ChunkToWrite<'a> {
    /// Owning document identifier.
    pub file_id: &'a str,
    /// Storage location of the document.
    pub storage_path: &'a str,
    /// Dense chunk index.
    pub chunk_index: usize,
    /// Chunk text.
    pub text: &'a str,
    /// Labels assigned to the chunk.
    pub labels: &'a [String],
}

/// Result of writing one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkWriteReport {
    /// Extraction or embedding failed and the chunk was written with reduced structure.
    pub extraction_degraded: bool,
    /// Entities committed with the chunk.
    pub entities: usize,
    /// Relationships committed with the chunk.
    pub relationships: usize,
}

/// Writes chunks into the graph store, one commit per chunk.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    extractor: Option<Arc<dyn GraphExtractor>>,
    embeddings: Arc<dyn EmbeddingClient>,
}

impl GraphWriter {
    /// Writer committing to `store`; without an extractor every chunk is written source-only.
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Option<Arc<dyn GraphExtractor>>,
        embeddings: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            store,
            extractor,
            embeddings,
        }
    }

    /// Store this writer commits to.
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Extract, enrich, and commit one chunk. Only commit failures are returned as errors.
    pub async fn write_chunk(
        &self,
        chunk: ChunkToWrite<'_>,
        settings: &WriteSettings,
    ) -> Result<ChunkWriteReport, GraphStoreError> {
        let mut report = ChunkWriteReport::default();
        let source = SourceChunk {
            file_id: chunk.file_id.to_string(),
            file_path: chunk.storage_path.to_string(),
            chunk_index: chunk.chunk_index,
            chunk_labels: chunk.labels.to_vec(),
            text: chunk.text.to_string(),
            embedding: None,
        };

        let extracted = match &self.extractor {
            Some(extractor) => match extractor.extract(chunk.text, &settings.schema).await {
                Ok(graph) => graph,
                Err(error) => {
                    tracing::warn!(
                        file_id = chunk.file_id,
                        chunk_index = chunk.chunk_index,
                        error = %error,
                        "Graph extraction failed; writing source chunk only"
                    );
                    report.extraction_degraded = true;
                    ExtractedGraph::default()
                }
            },
            None => ExtractedGraph::default(),
        };

        let mut document = normalize(extracted, source, settings.capitalization);
        if !self.attach_embeddings(&mut document, settings).await {
            report.extraction_degraded = true;
        }
        report.entities = document.nodes.len();
        report.relationships = document.relationships.len();

        self.store
            .commit(&settings.graph_name, &document, &settings.commit)
            .await?;
        Ok(report)
    }

    /// Returns false when any requested embedding could not be produced.
    async fn attach_embeddings(
        &self,
        document: &mut GraphDocument,
        settings: &WriteSettings,
    ) -> bool {
        let mut complete = true;

        if settings.embed_nodes && !document.nodes.is_empty() {
            let texts = document.nodes.iter().map(|node| node.id.clone()).collect();
            match self.embed(texts, document.nodes.len()).await {
                Some(vectors) => {
                    for (node, vector) in document.nodes.iter_mut().zip(vectors) {
                        node.embedding = Some(vector);
                    }
                }
                None => complete = false,
            }
        }

        if settings.embed_edges && !document.relationships.is_empty() {
            let texts = document
                .relationships
                .iter()
                .map(|rel| format!("{} {} {}", rel.source, rel.rel_type, rel.target))
                .collect();
            match self.embed(texts, document.relationships.len()).await {
                Some(vectors) => {
                    for (rel, vector) in document.relationships.iter_mut().zip(vectors) {
                        rel.embedding = Some(vector);
                    }
                }
                None => complete = false,
            }
        }

        if settings.embed_chunks && settings.commit.include_source {
            match self.embed(vec![document.source.text.clone()], 1).await {
                Some(mut vectors) => document.source.embedding = vectors.pop(),
                None => complete = false,
            }
        }

        complete
    }

    async fn embed(&self, texts: Vec<String>, expected: usize) -> Option<Vec<Vec<f32>>> {
        match self.embeddings.generate_embeddings(texts).await {
            Ok(vectors) if vectors.len() == expected => Some(vectors),
            Ok(vectors) => {
                tracing::warn!(expected, received = vectors.len(), "Embedding count mismatch");
                None
            }
            Err(error) => {
                tracing::warn!(error = %error, "Failed to embed graph elements");
                None
            }
        }
    }
}

/// Apply capitalization, merge duplicate entities, and make sure every edge endpoint exists.
fn normalize(
    extracted: ExtractedGraph,
    source: SourceChunk,
    capitalization: TextCapitalization,
) -> GraphDocument {
    let mut nodes: Vec<GraphNode> = Vec::with_capacity(extracted.nodes.len());
    for mut node in extracted.nodes {
        node.id = capitalization.apply(&node.id);
        match nodes.iter_mut().find(|existing| existing.id == node.id) {
            Some(existing) => existing.properties.extend(node.properties),
            None => nodes.push(node),
        }
    }

    let mut relationships = Vec::with_capacity(extracted.relationships.len());
    for mut rel in extracted.relationships {
        rel.source = capitalization.apply(&rel.source);
        rel.target = capitalization.apply(&rel.target);
        for endpoint in [&rel.source, &rel.target] {
            if !nodes.iter().any(|node| &node.id == endpoint) {
                nodes.push(GraphNode {
                    id: endpoint.clone(),
                    node_type: "Entity".into(),
                    properties: Default::default(),
                    embedding: None,
                });
            }
        }
        relationships.push(rel);
    }

    GraphDocument {
        nodes,
        relationships,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingClient;
    use crate::graph::{ExtractionError, GraphRelationship, InMemoryGraphStore};
    use async_trait::async_trait;
    use serde_json::Map;

    struct FixedExtractor(Option<ExtractedGraph>);

    #[async_trait]
    impl GraphExtractor for FixedExtractor {
        async fn extract(
            &self,
            _text: &str,
            _schema: &ExtractionSchema,
        ) -> Result<ExtractedGraph, ExtractionError> {
            self.0
                .clone()
                .ok_or_else(|| ExtractionError::Malformed("no graph".into()))
        }
    }

    fn node(id: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            node_type: "Organization".into(),
            properties: Map::new(),
            embedding: None,
        }
    }

    fn settings() -> WriteSettings {
        WriteSettings {
            graph_name: "G".into(),
            commit: CommitOptions::default(),
            schema: ExtractionSchema::default(),
            capitalization: TextCapitalization::Upper,
            embed_nodes: true,
            embed_edges: false,
            embed_chunks: false,
        }
    }

    fn chunk<'a>(labels: &'a [String]) -> ChunkToWrite<'a> {
        ChunkToWrite {
            file_id: "doc-1",
            storage_path: "/data/doc-1.txt",
            chunk_index: 0,
            text: "Acme partners with Globex.",
            labels,
        }
    }

    #[tokio::test]
    async fn capitalizes_entities_and_adds_missing_endpoints() {
        let store = Arc::new(InMemoryGraphStore::new());
        let extractor = FixedExtractor(Some(ExtractedGraph {
            nodes: vec![node("Acme"), node("acme")],
            relationships: vec![GraphRelationship {
                source: "Acme".into(),
                target: "Globex".into(),
                rel_type: "PARTNERS_WITH".into(),
                properties: Map::new(),
                embedding: None,
            }],
        }));
        let writer = GraphWriter::new(
            store.clone(),
            Some(Arc::new(extractor)),
            Arc::new(HashingEmbeddingClient::new(8)),
        );

        let labels = vec!["business".to_string()];
        let report = writer
            .write_chunk(chunk(&labels), &settings())
            .await
            .expect("written");

        assert!(!report.extraction_degraded);
        assert_eq!(report.entities, 2);
        let snapshot = store.snapshot("G");
        assert_eq!(snapshot.entities, vec!["ACME", "GLOBEX"]);
        assert_eq!(snapshot.chunks, vec![("doc-1".to_string(), 0usize, labels)]);
        assert_eq!(store.entity("G", "ACME"), Some(("Organization".to_string(), true)));
    }

    #[tokio::test]
    async fn extraction_failure_degrades_to_source_only() {
        let store = Arc::new(InMemoryGraphStore::new());
        let writer = GraphWriter::new(
            store.clone(),
            Some(Arc::new(FixedExtractor(None))),
            Arc::new(HashingEmbeddingClient::new(8)),
        );

        let report = writer
            .write_chunk(chunk(&[]), &settings())
            .await
            .expect("written");

        assert!(report.extraction_degraded);
        let snapshot = store.snapshot("G");
        assert_eq!(snapshot.chunks.len(), 1);
        assert!(snapshot.entities.is_empty());
    }

    #[tokio::test]
    async fn commit_failure_is_returned() {
        let store = Arc::new(InMemoryGraphStore::new());
        store.fail_commits_after(0);
        let writer = GraphWriter::new(store, None, Arc::new(HashingEmbeddingClient::new(8)));
        assert!(writer.write_chunk(chunk(&[]), &settings()).await.is_err());
    }
}
