//! Shared types used by the ArangoDB client and helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors returned while interacting with ArangoDB.
#[derive(Debug, Error)]
pub enum ArangoError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid ArangoDB URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// ArangoDB responded with an unexpected status code.
    #[error("Unexpected ArangoDB response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from ArangoDB.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// One page of an AQL cursor.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct CursorResponse {
    #[serde(default)]
    pub(crate) result: Vec<Value>,
    #[serde(rename = "hasMore", default)]
    pub(crate) has_more: bool,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) extra: Option<CursorExtra>,
}

impl CursorResponse {
    /// Number of documents written by the query, when reported.
    pub(crate) fn writes_executed(&self) -> u64 {
        self.extra
            .as_ref()
            .and_then(|extra| extra.stats.as_ref())
            .map(|stats| stats.writes_executed)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CursorExtra {
    #[serde(default)]
    pub(crate) stats: Option<CursorStats>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CursorStats {
    #[serde(rename = "writesExecuted", default)]
    pub(crate) writes_executed: u64,
}

/// Kind of collection to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Document collection.
    Document,
    /// Edge collection.
    Edge,
}

impl CollectionKind {
    pub(crate) const fn type_code(self) -> u8 {
        match self {
            Self::Document => 2,
            Self::Edge => 3,
        }
    }
}
