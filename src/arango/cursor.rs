//! Streaming helper for draining AQL cursors without manual paging loops.

use async_stream::try_stream;
use futures_core::Stream;
use serde_json::{Map, Value};

use super::client::ArangoClient;
use super::types::ArangoError;

const DEFAULT_BATCH_SIZE: usize = 500;

/// Stream every result document of `query`, following the cursor across pages.
pub fn stream_query<'a>(
    client: &'a ArangoClient,
    query: &'a str,
    bind_vars: Map<String, Value>,
) -> impl Stream<Item = Result<Value, ArangoError>> + 'a {
    try_stream! {
        let mut page = client.create_cursor(query, &bind_vars, DEFAULT_BATCH_SIZE).await?;

        loop {
            for document in std::mem::take(&mut page.result) {
                yield document;
            }

            match (page.has_more, page.id.take()) {
                (true, Some(cursor_id)) => {
                    page = client.next_batch(&cursor_id).await?;
                }
                (true, None) => {
                    tracing::warn!("Cursor reported more results without an id");
                    break;
                }
                (false, _) => break,
            }
        }
    }
}

/// Collect every string result of `query`.
pub async fn collect_strings(
    client: &ArangoClient,
    query: &str,
    bind_vars: Map<String, Value>,
) -> Result<Vec<String>, ArangoError> {
    use futures_util::{pin_mut, stream::StreamExt};

    let stream = stream_query(client, query, bind_vars);
    pin_mut!(stream);
    let mut values = Vec::new();
    while let Some(item) = stream.next().await {
        if let Value::String(text) = item? {
            values.push(text);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arango::client::tests::client_for;
    use httpmock::{
        Method::{POST, PUT},
        MockServer,
    };
    use serde_json::json;

    #[tokio::test]
    async fn collects_results_across_pages() {
        let server = MockServer::start_async().await;

        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/_db/kb/_api/cursor")
                    .body_contains("\"file_id\":\"doc-1\"");
                then.status(201).json_body(json!({
                    "result": ["G_SOURCE/a", "G_SOURCE/b"],
                    "hasMore": true,
                    "id": "77"
                }));
            })
            .await;

        let second = server
            .mock_async(|when, then| {
                when.method(PUT).path("/_db/kb/_api/cursor/77");
                then.status(200).json_body(json!({
                    "result": ["G_SOURCE/c"],
                    "hasMore": false
                }));
            })
            .await;

        let client = client_for(&server);
        let mut bind_vars = Map::new();
        bind_vars.insert("file_id".into(), json!("doc-1"));
        let ids = collect_strings(
            &client,
            "FOR s IN G_SOURCE FILTER s.file_id == @file_id RETURN s._id",
            bind_vars,
        )
        .await
        .expect("ids");

        first.assert();
        second.assert();
        assert_eq!(ids, vec!["G_SOURCE/a", "G_SOURCE/b", "G_SOURCE/c"]);
    }
}
