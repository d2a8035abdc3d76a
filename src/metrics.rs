use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and retraction activity.
#[derive(Default)]
pub struct IngestionMetrics {
    documents_ingested: AtomicU64,
    chunks_written: AtomicU64,
    ingestions_failed: AtomicU64,
    labelling_degraded: AtomicU64,
    extraction_degraded: AtomicU64,
    retractions: AtomicU64,
    chunks_retracted: AtomicU64,
}

impl IngestionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully ingested document.
    pub fn record_ingestion(
        &self,
        chunks_written: u64,
        labelling_degraded: u64,
        extraction_degraded: u64,
    ) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_written
            .fetch_add(chunks_written, Ordering::Relaxed);
        self.labelling_degraded
            .fetch_add(labelling_degraded, Ordering::Relaxed);
        self.extraction_degraded
            .fetch_add(extraction_degraded, Ordering::Relaxed);
    }

    /// Record an aborted ingestion.
    pub fn record_failure(&self) {
        self.ingestions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed retraction and the number of chunk nodes it removed.
    pub fn record_retraction(&self, chunks_removed: u64) {
        self.retractions.fetch_add(1, Ordering::Relaxed);
        self.chunks_retracted
            .fetch_add(chunks_removed, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_written: self.chunks_written.load(Ordering::Relaxed),
            ingestions_failed: self.ingestions_failed.load(Ordering::Relaxed),
            labelling_degraded: self.labelling_degraded.load(Ordering::Relaxed),
            extraction_degraded: self.extraction_degraded.load(Ordering::Relaxed),
            retractions: self.retractions.load(Ordering::Relaxed),
            chunks_retracted: self.chunks_retracted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents fully written to the graph since startup.
    pub documents_ingested: u64,
    /// Chunk graph documents committed across all ingestions.
    pub chunks_written: u64,
    /// Ingestions that ended in a structured failure.
    pub ingestions_failed: u64,
    /// Chunks that fell back to empty labels.
    pub labelling_degraded: u64,
    /// Chunks committed without extracted entities after an extraction failure.
    pub extraction_degraded: u64,
    /// Completed retraction runs, including compensating ones.
    pub retractions: u64,
    /// Chunk nodes removed by retractions.
    pub chunks_retracted: u64,
}
