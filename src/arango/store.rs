//! [`GraphStore`] backed by ArangoDB collections.

use crate::arango::client::ArangoClient;
use crate::arango::cursor::collect_strings;
use crate::arango::queries::{self, GraphCollections};
use crate::arango::types::CollectionKind;
use crate::graph::store::{CommitOptions, GraphStore, GraphStoreError, validate_graph_name};
use crate::graph::types::{GraphDocument, entity_key};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Graph store persisting chunks, entities, and edges into four collections per graph.
pub struct ArangoGraphStore {
    client: ArangoClient,
}

impl ArangoGraphStore {
    /// Wrap an ArangoDB client.
    pub fn new(client: ArangoClient) -> Self {
        Self { client }
    }

    fn collections(graph: &str) -> Result<GraphCollections, GraphStoreError> {
        validate_graph_name(graph)?;
        Ok(GraphCollections::for_graph(graph))
    }

    /// Run `query` once per batch of `docs`, bound as `@docs` next to the shared `vars`.
    async fn write_batches(
        &self,
        query: &str,
        docs: Vec<Value>,
        vars: &[(&str, Value)],
        options: &CommitOptions,
    ) -> Result<(), GraphStoreError> {
        for batch in docs.chunks(options.batch_size.max(1)) {
            let mut bound = bind(vars);
            bound.insert("docs".into(), Value::Array(batch.to_vec()));
            self.client.execute(query, bound, options.insert_async).await?;
        }
        Ok(())
    }

    async fn remove(
        &self,
        query: String,
        vars: Map<String, Value>,
    ) -> Result<u64, GraphStoreError> {
        Ok(self.client.execute(&query, vars, false).await?)
    }
}

fn bind(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

fn edge_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn put_embedding(doc: &mut Value, embedding: Option<&Vec<f32>>) {
    if let (Some(vector), Some(object)) = (embedding, doc.as_object_mut()) {
        object.insert("embedding".into(), json!(vector));
    }
}

#[async_trait]
impl GraphStore for ArangoGraphStore {
    async fn ensure_graph(&self, graph: &str) -> Result<(), GraphStoreError> {
        let c = Self::collections(graph)?;
        self.client
            .ensure_collection(&c.source, CollectionKind::Document)
            .await?;
        self.client
            .ensure_collection(&c.entity, CollectionKind::Document)
            .await?;
        self.client
            .ensure_collection(&c.has_source, CollectionKind::Edge)
            .await?;
        self.client
            .ensure_collection(&c.links_to, CollectionKind::Edge)
            .await?;
        self.client
            .ensure_named_graph(
                graph,
                json!([
                    { "collection": c.has_source, "from": [c.entity], "to": [c.source] },
                    { "collection": c.links_to, "from": [c.entity], "to": [c.entity] },
                ]),
            )
            .await?;
        Ok(())
    }

    async fn commit(
        &self,
        graph: &str,
        document: &GraphDocument,
        options: &CommitOptions,
    ) -> Result<(), GraphStoreError> {
        let c = Self::collections(graph)?;
        let source = &document.source;
        let source_key = source.key();
        let source_id = format!("{}/{}", c.source, source_key);

        if options.include_source {
            let mut doc = json!({
                "_key": source_key,
                "file_id": source.file_id,
                "file_path": source.file_path,
                "chunk_index": source.chunk_index,
                "chunk_labels": source.chunk_labels,
                "text": source.text,
                "ingested_at": current_timestamp_rfc3339(),
            });
            put_embedding(&mut doc, source.embedding.as_ref());
            self.client
                .execute(
                    &queries::insert_source(&c),
                    bind(&[("doc", doc)]),
                    options.insert_async,
                )
                .await?;
        }

        let entities: Vec<Value> = document
            .nodes
            .iter()
            .map(|node| {
                let mut doc = Value::Object(node.properties.clone());
                if let Some(object) = doc.as_object_mut() {
                    object.insert("_key".into(), json!(entity_key(&node.id)));
                    object.insert("text".into(), json!(node.id));
                    object.insert("type".into(), json!(node.node_type));
                }
                put_embedding(&mut doc, node.embedding.as_ref());
                doc
            })
            .collect();
        if options.include_source {
            self.write_batches(&queries::upsert_entities(&c), entities, &[], options).await?;
        } else {
            let claim = [("file_id", json!(source.file_id))];
            self.write_batches(&queries::upsert_claimed_entities(&c), entities, &claim, options)
                .await?;
        }

        if options.include_source {
            let sourcing: Vec<Value> = document
                .nodes
                .iter()
                .map(|node| {
                    let from = format!("{}/{}", c.entity, entity_key(&node.id));
                    json!({
                        "_key": edge_key(&[&from, &source_id]),
                        "_from": from,
                        "_to": source_id,
                    })
                })
                .collect();
            self.write_batches(&queries::insert_edges(&c.has_source), sourcing, &[], options)
                .await?;
        }

        let links: Vec<Value> = document
            .relationships
            .iter()
            .map(|rel| {
                let from = format!("{}/{}", c.entity, entity_key(&rel.source));
                let to = format!("{}/{}", c.entity, entity_key(&rel.target));
                let mut doc = Value::Object(rel.properties.clone());
                if let Some(object) = doc.as_object_mut() {
                    object.insert("_key".into(), json!(edge_key(&[&from, &to, &rel.rel_type])));
                    object.insert("_from".into(), json!(from));
                    object.insert("_to".into(), json!(to));
                    object.insert("type".into(), json!(rel.rel_type));
                }
                put_embedding(&mut doc, rel.embedding.as_ref());
                doc
            })
            .collect();
        self.write_batches(&queries::insert_edges(&c.links_to), links, &[], options).await?;

        tracing::debug!(
            graph,
            chunk_index = source.chunk_index,
            nodes = document.nodes.len(),
            relationships = document.relationships.len(),
            "Committed graph document"
        );
        Ok(())
    }

    async fn chunk_ids_for_file(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<Vec<String>, GraphStoreError> {
        let c = Self::collections(graph)?;
        let query = queries::chunk_ids_for_file(&c);
        Ok(collect_strings(&self.client, &query, bind(&[("file_id", json!(file_id))])).await?)
    }

    async fn delete_chunks(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<u64, GraphStoreError> {
        let c = Self::collections(graph)?;
        self.remove(
            queries::remove_chunks(&c),
            bind(&[("chunk_ids", json!(chunk_ids))]),
        )
        .await
    }

    async fn delete_source_edges_to(
        &self,
        graph: &str,
        chunk_ids: &[String],
    ) -> Result<u64, GraphStoreError> {
        let c = Self::collections(graph)?;
        self.remove(
            queries::remove_source_edges_to(&c),
            bind(&[("chunk_ids", json!(chunk_ids))]),
        )
        .await
    }

    async fn delete_orphan_entities(
        &self,
        graph: &str,
        file_id: &str,
    ) -> Result<u64, GraphStoreError> {
        let c = Self::collections(graph)?;
        let released = self
            .remove(queries::release_claims(&c), bind(&[("file_id", json!(file_id))]))
            .await?;
        tracing::debug!(graph, file_id, released, "Released entity claims");
        self.remove(queries::remove_orphan_entities(&c), Map::new()).await
    }

    async fn delete_dangling_source_edges(&self, graph: &str) -> Result<u64, GraphStoreError> {
        let c = Self::collections(graph)?;
        self.remove(queries::remove_dangling_source_edges(&c), Map::new()).await
    }

    async fn delete_dangling_relationship_edges(
        &self,
        graph: &str,
    ) -> Result<u64, GraphStoreError> {
        let c = Self::collections(graph)?;
        self.remove(queries::remove_dangling_links(&c), Map::new()).await
    }
}
