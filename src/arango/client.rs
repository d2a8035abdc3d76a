//! HTTP client wrapper for interacting with ArangoDB.

use crate::arango::types::{ArangoError, CollectionKind, CursorResponse};
use crate::config::GraphStoreConfig;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};

/// Lightweight HTTP client for one ArangoDB database.
pub struct ArangoClient {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) database: String,
    pub(crate) username: String,
    pub(crate) password: Option<String>,
}

impl ArangoClient {
    /// Construct a client from graph store configuration.
    pub fn new(config: &GraphStoreConfig) -> Result<Self, ArangoError> {
        let client = Client::builder().user_agent("graphprep/0.1").build()?;
        let base_url = normalize_base_url(&config.url).map_err(ArangoError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            database = %config.database,
            user = %config.username,
            "Initialized ArangoDB HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Create a collection, treating an existing one as success.
    pub async fn ensure_collection(
        &self,
        name: &str,
        kind: CollectionKind,
    ) -> Result<(), ArangoError> {
        let response = self
            .request(Method::POST, "_api/collection")
            .json(&json!({ "name": name, "type": kind.type_code() }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = name, "Collection already exists");
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(collection = name, ?kind, "Collection created");
        })
        .await
    }

    /// Register a named graph over existing collections, treating an existing one as success.
    pub async fn ensure_named_graph(
        &self,
        name: &str,
        edge_definitions: Value,
    ) -> Result<(), ArangoError> {
        let response = self
            .request(Method::POST, "_api/gharial")
            .json(&json!({ "name": name, "edgeDefinitions": edge_definitions }))
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::debug!(graph = name, "Named graph already exists");
            return Ok(());
        }
        self.ensure_success(response, || {
            tracing::debug!(graph = name, "Named graph created");
        })
        .await
    }

    /// Open a cursor for `query` and return its first page.
    pub(crate) async fn create_cursor(
        &self,
        query: &str,
        bind_vars: &Map<String, Value>,
        batch_size: usize,
    ) -> Result<CursorResponse, ArangoError> {
        let response = self
            .request(Method::POST, "_api/cursor")
            .json(&json!({
                "query": query,
                "bindVars": bind_vars,
                "batchSize": batch_size,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ArangoError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "AQL query failed");
            return Err(error);
        }
        Ok(response.json().await?)
    }

    /// Fetch the next page of an open cursor.
    pub(crate) async fn next_batch(&self, cursor_id: &str) -> Result<CursorResponse, ArangoError> {
        let response = self
            .request(Method::PUT, &format!("_api/cursor/{cursor_id}"))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ArangoError::UnexpectedStatus { status, body };
            tracing::error!(cursor = cursor_id, error = %error, "Failed to read cursor batch");
            return Err(error);
        }
        Ok(response.json().await?)
    }

    /// Run a data-modification query and return the number of documents written.
    ///
    /// With `fire_and_forget` the request is queued by the server (`x-arango-async`) and the
    /// returned count is zero.
    pub async fn execute(
        &self,
        query: &str,
        bind_vars: Map<String, Value>,
        fire_and_forget: bool,
    ) -> Result<u64, ArangoError> {
        if !fire_and_forget {
            return Ok(self.create_cursor(query, &bind_vars, 1000).await?.writes_executed());
        }

        let response = self
            .request(Method::POST, "_api/cursor")
            .header("x-arango-async", "true")
            .json(&json!({ "query": query, "bindVars": bind_vars }))
            .send()
            .await?;
        self.ensure_success(response, || {
            tracing::debug!("AQL write queued asynchronously");
        })
        .await?;
        Ok(0)
    }

    pub(crate) fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(
            &self.base_url,
            &format!("_db/{}/{}", self.database, path.trim_start_matches('/')),
        );
        self.client
            .request(method, url)
            .basic_auth(&self.username, self.password.as_deref())
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), ArangoError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ArangoError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "ArangoDB request failed");
            Err(error)
        }
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    pub(crate) fn client_for(server: &MockServer) -> ArangoClient {
        ArangoClient {
            client: Client::builder()
                .user_agent("graphprep-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            database: "kb".into(),
            username: "root".into(),
            password: Some("pw".into()),
        }
    }

    #[tokio::test]
    async fn existing_collection_is_not_an_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_db/kb/_api/collection")
                    .header_exists("authorization")
                    .json_body(json!({ "name": "G_SOURCE", "type": 2 }));
                then.status(409).json_body(json!({ "error": true, "errorNum": 1207 }));
            })
            .await;

        client_for(&server)
            .ensure_collection("G_SOURCE", CollectionKind::Document)
            .await
            .expect("conflict tolerated");
        mock.assert();
    }

    #[tokio::test]
    async fn execute_reports_writes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_db/kb/_api/cursor")
                    .body_contains("REMOVE");
                then.status(201).json_body(json!({
                    "result": [],
                    "hasMore": false,
                    "extra": { "stats": { "writesExecuted": 3 } }
                }));
            })
            .await;

        let writes = client_for(&server)
            .execute("FOR s IN G_SOURCE REMOVE s IN G_SOURCE", Map::new(), false)
            .await
            .expect("writes");
        assert_eq!(writes, 3);
    }

    #[tokio::test]
    async fn async_execute_sends_header() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_db/kb/_api/cursor")
                    .header("x-arango-async", "true");
                then.status(202);
            })
            .await;

        let writes = client_for(&server)
            .execute("INSERT {} INTO G_SOURCE", Map::new(), true)
            .await
            .expect("queued");
        mock.assert();
        assert_eq!(writes, 0);
    }

    #[tokio::test]
    async fn query_errors_surface_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/_db/kb/_api/cursor");
                then.status(400).body("syntax error");
            })
            .await;

        let error = client_for(&server)
            .execute("FOR", Map::new(), false)
            .await
            .expect_err("bad query");
        assert!(matches!(
            error,
            ArangoError::UnexpectedStatus { status, ref body }
                if status == StatusCode::BAD_REQUEST && body == "syntax error"
        ));
    }
}
