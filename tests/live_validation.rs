use std::io::Write;
use std::sync::Arc;

use graphprep::arango::{ArangoClient, ArangoGraphStore};
use graphprep::config::Config;
use graphprep::graph::GraphStore;
use graphprep::processing::{IngestRequest, IngestionApi, IngestionPipeline, RetractionRequest};

fn live_config() -> Arc<Config> {
    dotenvy::dotenv().ok();
    Arc::new(Config::from_env().expect("configuration from environment"))
}

#[tokio::test]
#[ignore = "Requires live ArangoDB"]
async fn live_arango_graph_setup_is_idempotent() {
    let config = live_config();
    let store = ArangoGraphStore::new(ArangoClient::new(&config.graph).expect("client"));
    let graph = format!("{}_LIVE", config.graph.default_graph_name);
    store.ensure_graph(&graph).await.expect("first ensure");
    store.ensure_graph(&graph).await.expect("second ensure");
}

#[tokio::test]
#[ignore = "Requires live ArangoDB and LLM endpoint"]
async fn live_ingest_then_retract_round_trip() {
    let config = live_config();
    let pipeline = IngestionPipeline::from_config(config.clone()).expect("pipeline");

    let mut file = tempfile::Builder::new()
        .suffix(".txt")
        .tempfile()
        .expect("temp file");
    writeln!(
        file,
        "Acme Renewables opened a green energy plant in Porto. The plant supplies Globex Logistics."
    )
    .expect("write");

    let file_id = format!("live-{}", uuid::Uuid::new_v4());
    let ingested = pipeline
        .ingest_file(IngestRequest::new(file_id.clone(), file.path()))
        .await;
    assert!(ingested.success, "{}", ingested.message);

    let retraction = RetractionRequest {
        file_id: file_id.clone(),
        graph_name: None,
    };
    let first = pipeline.retract_file(retraction.clone()).await;
    assert!(first.success, "{}", first.message);
    assert_eq!(Some(first.deleted_chunks.len()), ingested.chunk_count);

    let second = pipeline.retract_file(retraction).await;
    assert!(second.success);
    assert!(second.deleted_chunks.is_empty());
}
