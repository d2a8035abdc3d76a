use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use graphprep::config::Config;
use graphprep::graph::{GraphStore, InMemoryGraphStore};
use graphprep::logging;
use graphprep::processing::{IngestRequest, IngestionApi, IngestionPipeline, RetractionRequest};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "graphprep-cli",
    about = "Ingest documents into the knowledge graph or retract them"
)]
struct Cli {
    /// Write to an in-process graph instead of ArangoDB and print what would be stored.
    #[arg(long, global = true)]
    dry_run: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a single file.
    Ingest {
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        path: PathBuf,
        #[command(flatten)]
        options: IngestOptions,
    },
    /// Ingest every file below a directory; file ids are the relative paths.
    IngestDir {
        dir: PathBuf,
        /// Only ingest files with one of these extensions.
        #[arg(long, value_delimiter = ',')]
        extensions: Vec<String>,
        #[command(flatten)]
        options: IngestOptions,
    },
    /// Remove everything derived from a file id.
    Retract {
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        graph: Option<String>,
    },
}

#[derive(Args, Clone)]
struct IngestOptions {
    #[arg(long)]
    graph: Option<String>,
    #[arg(long, default_value_t = 1500)]
    chunk_size: usize,
    #[arg(long, default_value_t = 100)]
    chunk_overlap: usize,
    #[arg(long)]
    process_table: bool,
    #[arg(long)]
    no_chunks: bool,
}

impl IngestOptions {
    fn request(&self, file_id: String, path: &Path) -> IngestRequest {
        let mut request = IngestRequest::new(file_id, path);
        request.file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        request.graph_name = self.graph.clone();
        request.chunk_size = self.chunk_size;
        request.chunk_overlap = self.chunk_overlap;
        request.process_table = self.process_table;
        if self.no_chunks {
            request.include_chunks = Some(false);
        }
        request
    }
}

#[derive(Serialize)]
struct DryRunSummary {
    graph: String,
    chunks: usize,
    entities: usize,
    source_edges: usize,
    relationship_edges: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let config = Arc::new(Config::load().context("Failed to load configuration")?);

    let memory = cli.dry_run.then(|| Arc::new(InMemoryGraphStore::new()));
    let pipeline = match &memory {
        Some(store) => {
            let store: Arc<dyn GraphStore> = store.clone();
            IngestionPipeline::from_config_with_store(config.clone(), store)
        }
        None => IngestionPipeline::from_config(config.clone()),
    }
    .context("Failed to initialize ingestion pipeline")?;

    let graph = match cli.command {
        Command::Ingest {
            file_id,
            path,
            options,
        } => {
            let response = pipeline.ingest_file(options.request(file_id, &path)).await;
            print_json(&response)?;
            if !response.success {
                bail!("ingestion failed: {}", response.message);
            }
            options.graph
        }
        Command::IngestDir {
            dir,
            extensions,
            options,
        } => {
            ingest_dir(&pipeline, &dir, &extensions, &options).await?;
            options.graph
        }
        Command::Retract { file_id, graph } => {
            let response = pipeline
                .retract_file(RetractionRequest {
                    file_id,
                    graph_name: graph.clone(),
                })
                .await;
            print_json(&response)?;
            if !response.success {
                bail!("retraction failed: {}", response.message);
            }
            graph
        }
    };

    if let Some(store) = memory {
        let graph = graph.unwrap_or_else(|| config.graph.default_graph_name.clone());
        let snapshot = store.snapshot(&graph);
        print_json(&DryRunSummary {
            graph,
            chunks: snapshot.chunks.len(),
            entities: snapshot.entities.len(),
            source_edges: snapshot.source_edges,
            relationship_edges: snapshot.relationship_edges,
        })?;
    }
    print_json(&pipeline.metrics_snapshot())?;
    Ok(())
}

async fn ingest_dir(
    pipeline: &IngestionPipeline,
    dir: &Path,
    extensions: &[String],
    options: &IngestOptions,
) -> Result<()> {
    let mut failures = 0usize;
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() || !matches_extension(entry.path(), extensions) {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let file_id = relative.to_string_lossy().replace('\\', "/");
        let response = pipeline
            .ingest_file(options.request(file_id.clone(), entry.path()))
            .await;
        if !response.success {
            failures += 1;
        }
        println!(
            "{}\t{}\t{}",
            if response.success { "ok" } else { "failed" },
            file_id,
            response.message
        );
    }
    if failures > 0 {
        bail!("{failures} file(s) failed to ingest");
    }
    Ok(())
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
