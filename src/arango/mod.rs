//! ArangoDB HTTP client, AQL builders, and the graph store built on them.

pub mod client;
pub mod cursor;
pub mod queries;
pub mod store;
pub mod types;

pub use client::ArangoClient;
pub use cursor::{collect_strings, stream_query};
pub use store::ArangoGraphStore;
pub use types::{ArangoError, CollectionKind};
