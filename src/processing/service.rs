use super::chunking::{DocumentChunker, RecursiveChunker};
use super::guardrail::{GuardrailGate, GuardrailOutcome};
use super::labelling::{Bm25Labeller, Labeller, build_labeller};
use super::locks::FileLocks;
use super::retraction::{RetractionEngine, RetractionOutcome};
use super::types::{
    IngestPlan, IngestRequest, IngestionError, IngestionReport, IngestionResponse, PipelineStage,
    RetractionError, RetractionRequest, RetractionResponse,
};
use super::validation::validate_chunks;
use super::writer::{ChunkToWrite, GraphWriter};
use crate::arango::{ArangoClient, ArangoError, ArangoGraphStore};
use crate::config::{Config, LabellingStrategy};
use crate::embedding::{
    EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient, build_embedding_client,
};
use crate::graph::{GraphExtractor, GraphStore, LlmGraphExtractor, validate_graph_name};
use crate::guardrail::{GuardrailClientError, HttpGuardrailClient};
use crate::labels::{HttpLabelDirectory, LabelDirectory, LabelDirectoryError, StaticLabelDirectory};
use crate::llm::{CompletionError, build_completion_client};
use crate::loader::{
    DocumentLoader, FsDocumentLoader, LoadError, PdfLayoutTableExtractor, TableExtractor, is_pdf,
};
use crate::metrics::{IngestionMetrics, MetricsSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

/// Errors raised while wiring a pipeline from configuration.
#[derive(Debug, Error)]
pub enum PipelineBuildError {
    /// Graph store client could not be created.
    #[error("Failed to build graph store client: {0}")]
    GraphStore(#[from] ArangoError),
    /// Embedding client could not be created.
    #[error("Failed to build embedding client: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Completion client could not be created.
    #[error("Failed to build completion client: {0}")]
    Completion(#[from] CompletionError),
    /// Guardrail client could not be created.
    #[error("Failed to build guardrail client: {0}")]
    Guardrail(#[from] GuardrailClientError),
    /// Label directory client could not be created.
    #[error("Failed to build label directory client: {0}")]
    LabelDirectory(#[from] LabelDirectoryError),
}

/// Liveness report for the service surface.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Graph used when requests do not name one.
    pub default_graph: String,
    /// Active labelling strategy.
    pub labelling_strategy: &'static str,
    /// Whether the guardrail gate performs checks.
    pub guardrail_enabled: bool,
    /// Whether entity extraction runs during writes.
    pub extraction_enabled: bool,
}

/// Operations exposed to the HTTP and CLI surfaces.
///
/// Both calls always produce a structured result; pipeline errors never escape as `Err`.
#[async_trait]
pub trait IngestionApi: Send + Sync {
    /// Run the full ingestion pipeline for one document.
    async fn ingest_file(&self, request: IngestRequest) -> IngestionResponse;

    /// Remove every graph element derived from one document.
    async fn retract_file(&self, request: RetractionRequest) -> RetractionResponse;

    /// Current ingestion counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Liveness and configuration summary.
    fn health(&self) -> HealthSnapshot;
}

/// Coordinates load, chunk, validate, guardrail, label, and write for each document, and the
/// cascading retraction that undoes it.
///
/// Construct once near process start and share through an `Arc`. Work on the same
/// `(graph, file_id)` is serialized; different documents run concurrently.
pub struct IngestionPipeline {
    config: Arc<Config>,
    loader: Arc<dyn DocumentLoader>,
    tables: Option<Arc<dyn TableExtractor>>,
    chunker: Arc<dyn DocumentChunker>,
    directory: Arc<dyn LabelDirectory>,
    labeller: Arc<dyn Labeller>,
    guardrail: GuardrailGate,
    writer: GraphWriter,
    retraction: RetractionEngine,
    locks: FileLocks,
    metrics: Arc<IngestionMetrics>,
}

/// Assembles an [`IngestionPipeline`], falling back to local defaults for anything not set.
pub struct IngestionPipelineBuilder {
    config: Arc<Config>,
    store: Arc<dyn GraphStore>,
    loader: Option<Arc<dyn DocumentLoader>>,
    tables: Option<Arc<dyn TableExtractor>>,
    chunker: Option<Arc<dyn DocumentChunker>>,
    directory: Option<Arc<dyn LabelDirectory>>,
    labeller: Option<Arc<dyn Labeller>>,
    guardrail: Option<GuardrailGate>,
    extractor: Option<Arc<dyn GraphExtractor>>,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
    metrics: Option<Arc<IngestionMetrics>>,
}

impl IngestionPipelineBuilder {
    /// Document loader; defaults to [`FsDocumentLoader`].
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Table extractor consulted for PDF sources when `processTable` is set.
    pub fn table_extractor(mut self, tables: Arc<dyn TableExtractor>) -> Self {
        self.tables = Some(tables);
        self
    }

    /// Chunking strategy; defaults to [`RecursiveChunker`].
    pub fn chunker(mut self, chunker: Arc<dyn DocumentChunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Label directory; defaults to the configured static labels.
    pub fn label_directory(mut self, directory: Arc<dyn LabelDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Labelling strategy; defaults to BM25 with the configured threshold.
    pub fn labeller(mut self, labeller: Arc<dyn Labeller>) -> Self {
        self.labeller = Some(labeller);
        self
    }

    /// Safety gate; defaults to disabled.
    pub fn guardrail(mut self, guardrail: GuardrailGate) -> Self {
        self.guardrail = Some(guardrail);
        self
    }

    /// Entity extractor; without one every chunk is written source-only.
    pub fn extractor(mut self, extractor: Arc<dyn GraphExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Embedding client used for graph enrichment; defaults to the hashing client.
    pub fn embeddings(mut self, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Shared metrics registry.
    pub fn metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Finish construction.
    pub fn build(self) -> IngestionPipeline {
        let config = self.config;
        let embeddings = self.embeddings.unwrap_or_else(|| {
            Arc::new(HashingEmbeddingClient::new(config.embedding.dimension))
        });
        let directory = self.directory.unwrap_or_else(|| {
            Arc::new(StaticLabelDirectory::new(
                config.labelling.static_labels.clone(),
            ))
        });
        let labeller = self
            .labeller
            .unwrap_or_else(|| Arc::new(Bm25Labeller::new(config.labelling.bm25_threshold)));

        IngestionPipeline {
            loader: self.loader.unwrap_or_else(|| Arc::new(FsDocumentLoader::new())),
            tables: self.tables,
            chunker: self.chunker.unwrap_or_else(|| Arc::new(RecursiveChunker)),
            directory,
            labeller,
            guardrail: self.guardrail.unwrap_or_else(GuardrailGate::disabled),
            writer: GraphWriter::new(self.store.clone(), self.extractor, embeddings),
            retraction: RetractionEngine::new(self.store),
            locks: FileLocks::new(),
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(IngestionMetrics::new())),
            config,
        }
    }
}

fn strategy_name(strategy: LabellingStrategy) -> &'static str {
    match strategy {
        LabellingStrategy::Bm25 => "bm25",
        LabellingStrategy::Embedding => "embedding",
        LabellingStrategy::Llm => "llm",
    }
}

impl IngestionPipeline {
    /// Start building a pipeline writing to `store`.
    pub fn builder(config: Arc<Config>, store: Arc<dyn GraphStore>) -> IngestionPipelineBuilder {
        IngestionPipelineBuilder {
            config,
            store,
            loader: None,
            tables: None,
            chunker: None,
            directory: None,
            labeller: None,
            guardrail: None,
            extractor: None,
            embeddings: None,
            metrics: None,
        }
    }

    /// Wire every collaborator from configuration, writing to ArangoDB.
    pub fn from_config(config: Arc<Config>) -> Result<Self, PipelineBuildError> {
        let store = Arc::new(ArangoGraphStore::new(ArangoClient::new(&config.graph)?));
        Self::from_config_with_store(config, store)
    }

    /// Wire every collaborator from configuration around an existing graph store.
    pub fn from_config_with_store(
        config: Arc<Config>,
        store: Arc<dyn GraphStore>,
    ) -> Result<Self, PipelineBuildError> {
        let embeddings = build_embedding_client(&config.embedding)?;
        let completions = build_completion_client(&config.llm)?;
        tracing::info!(
            labelling = strategy_name(config.labelling.strategy),
            extraction = config.llm.extraction_enabled,
            guardrail = config.guardrail.enabled,
            "Initializing ingestion pipeline"
        );

        let directory: Arc<dyn LabelDirectory> = match &config.labelling.directory_url {
            Some(url) => Arc::new(HttpLabelDirectory::new(
                url.clone(),
                config.labelling.directory_token.clone(),
            )?),
            None => Arc::new(StaticLabelDirectory::new(
                config.labelling.static_labels.clone(),
            )),
        };
        let guardrail = if config.guardrail.enabled {
            let client =
                HttpGuardrailClient::new(config.guardrail.url.clone(), config.guardrail.timeout)?;
            GuardrailGate::new(Arc::new(client), config.guardrail.timeout)
        } else {
            GuardrailGate::disabled()
        };
        let labeller = build_labeller(&config.labelling, embeddings.clone(), completions.clone());

        let mut builder = Self::builder(config.clone(), store)
            .label_directory(directory)
            .labeller(labeller)
            .guardrail(guardrail)
            .table_extractor(Arc::new(PdfLayoutTableExtractor::new()))
            .embeddings(embeddings);
        if config.llm.extraction_enabled {
            builder = builder.extractor(Arc::new(LlmGraphExtractor::new(completions)));
        }
        Ok(builder.build())
    }

    /// Shared metrics registry.
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Ingest one document end to end.
    ///
    /// Any failure before `Writing` leaves the graph untouched. A failed commit aborts the
    /// remaining chunks and runs a compensating retraction for the document.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestionReport, IngestionError> {
        let plan = request.resolve(&self.config);
        if plan.file_id.trim().is_empty() {
            self.metrics.record_failure();
            return Err(IngestionError::InvalidRequest("fileId must not be empty".into()));
        }
        if let Err(error) = validate_graph_name(&plan.write.graph_name) {
            self.metrics.record_failure();
            return Err(IngestionError::InvalidRequest(error.to_string()));
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "ingest",
            %run_id,
            file_id = %plan.file_id,
            graph = %plan.write.graph_name
        );
        async move {
            let _guard = self
                .locks
                .acquire(&plan.write.graph_name, &plan.file_id)
                .await;
            let result = self.run_stages(&plan).await;
            match &result {
                Ok(report) => {
                    self.metrics.record_ingestion(
                        report.chunk_count as u64,
                        report.labelling_degraded as u64,
                        report.extraction_degraded as u64,
                    );
                    tracing::info!(
                        stage = %PipelineStage::Done,
                        chunks = report.chunk_count,
                        labelling_degraded = report.labelling_degraded,
                        extraction_degraded = report.extraction_degraded,
                        "Document ingested"
                    );
                }
                Err(error) => {
                    self.metrics.record_failure();
                    tracing::error!(
                        stage = %PipelineStage::Failed,
                        failed_in = %error.stage(),
                        error = %error,
                        "Ingestion failed"
                    );
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        plan: &IngestPlan,
    ) -> Result<IngestionReport, IngestionError> {
        tracing::info!(stage = %PipelineStage::Loading, path = %plan.file_path.display());
        let document = self.loader.load(&plan.file_path).await?;
        if document.is_empty() {
            return Err(LoadError::Empty(plan.file_path.clone()).into());
        }
        let tables = self.extract_tables(plan).await;

        tracing::info!(stage = %PipelineStage::Chunking, chunk_size = plan.chunk_size);
        let chunks = self
            .chunker
            .chunk(&document, tables, plan.chunk_size, plan.chunk_overlap)?;

        tracing::info!(stage = %PipelineStage::Validating, chunks = chunks.len());
        let summary = validate_chunks(&chunks);
        if !summary.passes() {
            return Err(IngestionError::Validation {
                valid: summary.valid,
                total: summary.total,
            });
        }

        tracing::info!(
            stage = %PipelineStage::GuardrailChecking,
            enabled = self.guardrail.is_enabled()
        );
        if let GuardrailOutcome::Blocked {
            chunk_index,
            failure,
        } = self.guardrail.check(&chunks).await
        {
            return Err(IngestionError::GuardrailViolation {
                chunk_index,
                reason: failure.reason(),
            });
        }

        tracing::info!(stage = %PipelineStage::Labelling);
        let label_set = self.directory.fetch_labels().await?;
        if label_set.is_empty() {
            tracing::warn!("Label directory is empty; chunks will carry no labels");
        }
        let assignment = self.labeller.label(&chunks, &label_set).await;

        tracing::info!(stage = %PipelineStage::Writing);
        let graph = plan.write.graph_name.as_str();
        self.writer
            .store()
            .ensure_graph(graph)
            .await
            .map_err(|source| IngestionError::GraphWrite {
                chunk_index: None,
                source,
                compensation: None,
            })?;

        let mut report = IngestionReport {
            file_id: plan.file_id.clone(),
            graph_name: plan.write.graph_name.clone(),
            chunk_count: 0,
            labelling_degraded: assignment.degraded,
            extraction_degraded: 0,
        };
        for (chunk_index, text) in chunks.iter().enumerate() {
            let labels = assignment
                .labels
                .get(chunk_index)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let chunk = ChunkToWrite {
                file_id: &plan.file_id,
                storage_path: &plan.storage_path,
                chunk_index,
                text,
                labels,
            };
            match self.writer.write_chunk(chunk, &plan.write).await {
                Ok(written) => {
                    report.chunk_count += 1;
                    if written.extraction_degraded {
                        report.extraction_degraded += 1;
                    }
                }
                Err(source) => {
                    tracing::warn!(
                        chunk_index,
                        error = %source,
                        "Commit failed; retracting partial writes"
                    );
                    let compensation = self.compensate(graph, &plan.file_id).await;
                    return Err(IngestionError::GraphWrite {
                        chunk_index: Some(chunk_index),
                        source,
                        compensation,
                    });
                }
            }
        }
        Ok(report)
    }

    async fn extract_tables(&self, plan: &IngestPlan) -> Vec<String> {
        if !plan.process_table || !is_pdf(&plan.file_path) {
            return Vec::new();
        }
        let Some(tables) = &self.tables else {
            tracing::warn!("Table extraction requested but no extractor is configured");
            return Vec::new();
        };
        match tables
            .extract_tables(&plan.file_path, &plan.table_strategy)
            .await
        {
            Ok(tables) => tables,
            Err(error) => {
                tracing::warn!(
                    error = %error,
                    "Table extraction failed; continuing with text only"
                );
                Vec::new()
            }
        }
    }

    /// Runs under the lock already held by the failed ingestion.
    async fn compensate(&self, graph: &str, file_id: &str) -> Option<RetractionError> {
        match self.retraction.retract(graph, file_id).await {
            Ok(outcome) => {
                self.metrics
                    .record_retraction(outcome.deleted_chunk_ids.len() as u64);
                None
            }
            Err(error) => {
                tracing::error!(error = %error, "Compensating retraction failed");
                Some(error)
            }
        }
    }

    /// Retract everything derived from one document.
    pub async fn retract(
        &self,
        request: RetractionRequest,
    ) -> Result<RetractionOutcome, IngestionError> {
        let graph = request
            .graph_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.config.graph.default_graph_name.clone());
        if request.file_id.trim().is_empty() {
            return Err(IngestionError::InvalidRequest("fileId must not be empty".into()));
        }
        validate_graph_name(&graph)
            .map_err(|error| IngestionError::InvalidRequest(error.to_string()))?;

        let _guard = self.locks.acquire(&graph, &request.file_id).await;
        let outcome = self.retraction.retract(&graph, &request.file_id).await?;
        self.metrics
            .record_retraction(outcome.deleted_chunk_ids.len() as u64);
        Ok(outcome)
    }
}

#[async_trait]
impl IngestionApi for IngestionPipeline {
    async fn ingest_file(&self, request: IngestRequest) -> IngestionResponse {
        match self.ingest(request).await {
            Ok(report) => IngestionResponse::from_report(&report),
            Err(error) => IngestionResponse::from_error(&error),
        }
    }

    async fn retract_file(&self, request: RetractionRequest) -> RetractionResponse {
        let file_id = request.file_id.clone();
        match self.retract(request).await {
            Ok(outcome) => RetractionResponse::succeeded(&file_id, outcome.deleted_chunk_ids),
            Err(error) => {
                tracing::error!(file_id = %file_id, error = %error, "Retraction failed");
                RetractionResponse::failed(&error)
            }
        }
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: "ok",
            default_graph: self.config.graph.default_graph_name.clone(),
            labelling_strategy: strategy_name(self.config.labelling.strategy),
            guardrail_enabled: self.guardrail.is_enabled(),
            extraction_enabled: self.config.llm.extraction_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::graph::InMemoryGraphStore;
    use crate::loader::LoadedDocument;
    use std::io::Write;
    use std::path::Path;

    struct TextLoader(&'static str);

    #[async_trait]
    impl DocumentLoader for TextLoader {
        async fn load(&self, _path: &Path) -> Result<LoadedDocument, LoadError> {
            Ok(LoadedDocument::Text(self.0.to_string()))
        }
    }

    struct FixedTables(Option<&'static str>);

    #[async_trait]
    impl TableExtractor for FixedTables {
        async fn extract_tables(
            &self,
            _path: &Path,
            _strategy: &str,
        ) -> Result<Vec<String>, LoadError> {
            match self.0 {
                Some(table) => Ok(vec![table.to_string()]),
                None => Err(LoadError::Unsupported("table strategy fast".into())),
            }
        }
    }

    fn pdf_pipeline(store: Arc<InMemoryGraphStore>, tables: FixedTables) -> IngestionPipeline {
        IngestionPipeline::builder(Arc::new(test_config()), store)
            .loader(Arc::new(TextLoader("Annual business report with regional revenue.")))
            .table_extractor(Arc::new(tables))
            .build()
    }

    fn table_request() -> IngestRequest {
        let mut request = IngestRequest::new("doc-pdf", "/virtual/report.pdf");
        request.process_table = true;
        request
    }

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    fn pipeline(store: Arc<InMemoryGraphStore>) -> IngestionPipeline {
        IngestionPipeline::builder(Arc::new(test_config()), store).build()
    }

    #[tokio::test]
    async fn ingests_and_reports_chunk_count() {
        let store = Arc::new(InMemoryGraphStore::new());
        let file = write_temp("Solar farms and wind parks supply green energy to the region.");
        let pipeline = pipeline(store.clone());

        let response = pipeline
            .ingest_file(IngestRequest::new("doc-1", file.path()))
            .await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.chunk_count, Some(1));
        assert_eq!(response.message, "File ingested with 1 chunks.");
        assert_eq!(store.snapshot("GRAPH_TEST").chunks.len(), 1);
        assert_eq!(pipeline.metrics_snapshot().documents_ingested, 1);
    }

    #[tokio::test]
    async fn missing_file_is_a_structured_failure() {
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = pipeline(store.clone());

        let response = pipeline
            .ingest_file(IngestRequest::new("doc-1", "/nonexistent/graphprep/doc.txt"))
            .await;
        assert!(!response.success);
        assert!(response.message.starts_with("Failed to load document"));
        assert_eq!(store.commit_count(), 0);
        assert_eq!(pipeline.metrics_snapshot().ingestions_failed, 1);
    }

    #[tokio::test]
    async fn invalid_graph_name_is_rejected_before_loading() {
        let pipeline = pipeline(Arc::new(InMemoryGraphStore::new()));
        let mut request = IngestRequest::new("doc-1", "/nonexistent/doc.txt");
        request.graph_name = Some("bad name".into());

        let error = pipeline.ingest(request).await.expect_err("rejected");
        assert!(matches!(error, IngestionError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn retraction_response_uses_default_graph() {
        let store = Arc::new(InMemoryGraphStore::new());
        let file = write_temp("Quarterly business results were strong across every segment.");
        let pipeline = pipeline(store.clone());
        pipeline
            .ingest_file(IngestRequest::new("doc-9", file.path()))
            .await;

        let response = pipeline
            .retract_file(RetractionRequest {
                file_id: "doc-9".into(),
                graph_name: None,
            })
            .await;
        assert_eq!(response.status, 200);
        assert!(response.success);
        assert_eq!(response.message, "Data retraction succeeded for file_id=doc-9");
        assert_eq!(response.deleted_chunks.len(), 1);
        assert!(store.snapshot("GRAPH_TEST").chunks.is_empty());
    }

    #[tokio::test]
    async fn pdf_tables_are_appended_as_chunks() {
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = pdf_pipeline(
            store.clone(),
            FixedTables(Some("Region | Revenue\nNorth | 120")),
        );

        let response = pipeline.ingest_file(table_request()).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.chunk_count, Some(2));

        let mut without_tables = table_request();
        without_tables.file_id = "doc-pdf-text".into();
        without_tables.process_table = false;
        let response = pipeline.ingest_file(without_tables).await;
        assert_eq!(response.chunk_count, Some(1));
    }

    #[tokio::test]
    async fn failed_table_extraction_keeps_text_chunks() {
        let store = Arc::new(InMemoryGraphStore::new());
        let pipeline = pdf_pipeline(store.clone(), FixedTables(None));

        let response = pipeline.ingest_file(table_request()).await;
        assert!(response.success, "{}", response.message);
        assert_eq!(response.chunk_count, Some(1));
    }

    #[test]
    fn health_reports_configuration() {
        let pipeline = pipeline(Arc::new(InMemoryGraphStore::new()));
        let health = pipeline.health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.default_graph, "GRAPH_TEST");
        assert!(!health.guardrail_enabled);
    }
}
