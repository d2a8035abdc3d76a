//! Controlled label vocabulary and the directories it is fetched from.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Errors raised while fetching the label directory.
#[derive(Debug, Error)]
pub enum LabelDirectoryError {
    /// HTTP request failed before a response was received.
    #[error("Label directory request failed: {0}")]
    Request(String),
    /// Directory answered with a non-success status.
    #[error("Label directory returned status {status}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
    },
    /// Directory response could not be decoded.
    #[error("Malformed label directory response: {0}")]
    InvalidResponse(String),
}

/// Ordered, de-duplicated set of allowed label names.
///
/// Order follows first appearance in the directory so prompts and scoring are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
    index: HashSet<String>,
}

impl LabelSet {
    /// Build a set from names, trimming whitespace and dropping blanks and duplicates.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            let name: String = name.into();
            let trimmed = name.trim();
            if trimmed.is_empty() || set.index.contains(trimmed) {
                continue;
            }
            set.index.insert(trimmed.to_string());
            set.names.push(trimmed.to_string());
        }
        set
    }

    /// Whether `label` is an allowed name (exact match).
    pub fn contains(&self, label: &str) -> bool {
        self.index.contains(label)
    }

    /// Allowed names in directory order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of allowed names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the directory returned no names.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Source of the allowed label vocabulary, consulted once per ingestion.
#[async_trait]
pub trait LabelDirectory: Send + Sync {
    /// Fetch the current label set.
    async fn fetch_labels(&self) -> Result<LabelSet, LabelDirectoryError>;
}

/// Fixed label list taken from configuration.
pub struct StaticLabelDirectory {
    labels: LabelSet,
}

impl StaticLabelDirectory {
    /// Wrap a list of names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: LabelSet::new(names),
        }
    }
}

#[async_trait]
impl LabelDirectory for StaticLabelDirectory {
    async fn fetch_labels(&self) -> Result<LabelSet, LabelDirectoryError> {
        Ok(self.labels.clone())
    }
}

/// Service-category directory exposed over HTTP.
pub struct HttpLabelDirectory {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpLabelDirectory {
    /// Build a directory client for `base_url`, presenting `token` as a bearer credential.
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, LabelDirectoryError> {
        let http = Client::builder()
            .user_agent("graphprep/labels")
            .build()
            .map_err(|error| LabelDirectoryError::Request(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            token,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/service-categories/categories",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
    #[serde(default)]
    children: Vec<CategoryChild>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CategoryChild {
    Name(String),
    Nested { name: String },
}

#[async_trait]
impl LabelDirectory for HttpLabelDirectory {
    async fn fetch_labels(&self) -> Result<LabelSet, LabelDirectoryError> {
        let mut request = self.http.get(self.endpoint());
        if let Some(token) = self.token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|error| LabelDirectoryError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Failed to fetch labels");
            return Err(LabelDirectoryError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let categories: Vec<Category> = response
            .json()
            .await
            .map_err(|error| LabelDirectoryError::InvalidResponse(error.to_string()))?;

        let names = categories.into_iter().flat_map(|category| {
            std::iter::once(category.name).chain(category.children.into_iter().map(
                |child| match child {
                    CategoryChild::Name(name) | CategoryChild::Nested { name } => name,
                },
            ))
        });
        let labels = LabelSet::new(names);
        tracing::debug!(labels = labels.len(), "Fetched label directory");
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::GET, MockServer};
    use serde_json::json;

    #[test]
    fn label_set_preserves_first_appearance_and_drops_duplicates() {
        let set = LabelSet::new(["business", " green energy ", "business", ""]);
        assert_eq!(set.names(), ["business", "green energy"]);
        assert!(set.contains("green energy"));
        assert!(!set.contains("Business"));
    }

    #[tokio::test]
    async fn http_directory_flattens_categories() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/service-categories/categories")
                    .header("authorization", "Bearer token-1");
                then.status(200).json_body(json!([
                    { "name": "energy", "children": ["green energy", "oil"] },
                    { "name": "finance", "children": [{ "name": "business" }, "oil"] },
                    { "name": "sports" }
                ]));
            })
            .await;

        let directory =
            HttpLabelDirectory::new(server.base_url(), Some("token-1".into())).expect("client");
        let labels = directory.fetch_labels().await.expect("labels");

        mock.assert();
        assert_eq!(
            labels.names(),
            ["energy", "green energy", "oil", "finance", "business", "sports"]
        );
    }

    #[tokio::test]
    async fn http_directory_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/service-categories/categories");
                then.status(401);
            })
            .await;

        let directory = HttpLabelDirectory::new(server.base_url(), None).expect("client");
        let error = directory.fetch_labels().await.expect_err("unauthorized");
        assert!(matches!(
            error,
            LabelDirectoryError::UnexpectedStatus { status: 401 }
        ));
    }
}
