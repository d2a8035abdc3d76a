//! Per-document serialization of ingestion and retraction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of async locks keyed by `(graph, file_id)`.
///
/// Work on different documents proceeds in parallel; work on the same document queues.
#[derive(Debug, Default)]
pub struct FileLocks {
    entries: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
}

/// Held while a document is being ingested or retracted.
#[derive(Debug)]
pub struct FileGuard {
    _guard: OwnedMutexGuard<()>,
}

impl FileLocks {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `file_id` within `graph`.
    pub async fn acquire(&self, graph: &str, file_id: &str) -> FileGuard {
        let lock = {
            let mut entries = match self.entries.lock() {
                Ok(entries) => entries,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Entries only referenced by the map are idle.
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            entries
                .entry((graph.to_string(), file_id.to_string()))
                .or_default()
                .clone()
        };
        FileGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of documents with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}
