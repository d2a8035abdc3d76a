//! Character-budgeted chunking of loaded documents.
//!
//! Free text goes through `semchunk-rs`, which splits recursively on the largest semantic
//! boundary available (blank lines, newlines, sentence ends, whitespace) until every piece fits
//! the budget. Sizes are counted in characters. A sliding overlap taken from the tail of the
//! previous chunk is prepended afterwards and trimmed back into budget.
//!
//! Structured sources arrive pre-split into records; only records longer than the budget are
//! split further.

use crate::loader::LoadedDocument;
use semchunk_rs::Chunker;
use std::sync::Arc;

use super::types::ChunkingError;

type SizeCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Budget used when the first split leaves an oversized chunk behind.
pub const FALLBACK_CHUNK_SIZE: usize = 500;

/// Strategy turning a loaded document into ordered chunk strings.
pub trait DocumentChunker: Send + Sync {
    /// Split `document` into chunks of at most `chunk_size` characters and append `tables`.
    fn chunk(
        &self,
        document: &LoadedDocument,
        tables: Vec<String>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>, ChunkingError>;
}

/// Recursive semantic splitter with a one-shot conservative fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecursiveChunker;

impl DocumentChunker for RecursiveChunker {
    fn chunk(
        &self,
        document: &LoadedDocument,
        tables: Vec<String>,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Vec<String>, ChunkingError> {
        chunk_document(document, tables, chunk_size, overlap)
    }
}

/// Chunk a loaded document, guaranteeing no chunk exceeds `chunk_size` characters.
///
/// Table chunks are appended verbatim after the text chunks. Returns
/// [`ChunkingError::NoChunks`] when nothing survives.
pub fn chunk_document(
    document: &LoadedDocument,
    tables: Vec<String>,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = match document {
        LoadedDocument::Records(records) => {
            let mut chunks = Vec::with_capacity(records.len());
            for record in records.iter().filter(|record| !record.trim().is_empty()) {
                if char_count(record) > chunk_size {
                    chunks.extend(split_text(record, chunk_size, overlap));
                } else {
                    chunks.push(record.clone());
                }
            }
            chunks
        }
        LoadedDocument::Text(text) => split_text(text, chunk_size, overlap),
    };

    chunks.extend(tables.into_iter().filter(|table| !table.trim().is_empty()));
    chunks.retain(|chunk| !chunk.trim().is_empty());

    if chunks.is_empty() {
        return Err(ChunkingError::NoChunks);
    }
    Ok(chunks)
}

/// Split free text, re-splitting once at the fallback size when the first pass overshoots.
fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let counter = char_counter();
    let chunks = chunk_text_with_counter(text, chunk_size, overlap, counter.clone());
    if chunks.iter().all(|chunk| char_count(chunk) <= chunk_size) {
        return chunks;
    }

    let fallback = FALLBACK_CHUNK_SIZE.min(chunk_size);
    tracing::warn!(
        chunk_size,
        fallback,
        "Chunk exceeded budget; re-splitting with fallback size"
    );
    chunk_text_with_counter(text, fallback, overlap, counter)
        .into_iter()
        .flat_map(|chunk| hard_split(&chunk, fallback))
        .collect()
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn char_counter() -> SizeCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

/// Cut `text` into windows of at most `limit` characters.
fn hard_split(text: &str, limit: usize) -> Vec<String> {
    if char_count(text) <= limit {
        return vec![text.to_string()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(limit.max(1))
        .map(|window| window.iter().collect::<String>())
        .collect()
}

fn chunk_text_with_counter(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    counter: SizeCounter,
) -> Vec<String> {
    let counter_for_chunker = counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter_for_chunker.as_ref()(segment)),
    );
    let base_chunks = chunker.chunk(text);
    apply_overlap(base_chunks, chunk_size, overlap, &counter)
}

/// Prefix each chunk after the first with up to `overlap` characters from the previous one.
fn apply_overlap(
    chunks: Vec<String>,
    chunk_size: usize,
    overlap: usize,
    counter: &SizeCounter,
) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if chunks.len() < 2 || effective_overlap == 0 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut previous: Option<String> = None;
    for current in chunks {
        let next = match previous.as_deref() {
            Some(prev) => {
                build_overlapped_chunk(prev, &current, effective_overlap, chunk_size, counter)
            }
            None => current.clone(),
        };
        overlapped.push(next);
        previous = Some(current);
    }
    overlapped
}

fn build_overlapped_chunk(
    previous: &str,
    current: &str,
    overlap: usize,
    chunk_size: usize,
    counter: &SizeCounter,
) -> String {
    let tail = tail_within_limit(previous, overlap, counter);
    let mut combined = String::with_capacity(tail.len() + current.len() + 1);

    if !tail.is_empty() {
        combined.push_str(tail);
        if !ends_with_whitespace(tail) && !starts_with_whitespace(current) {
            combined.push(' ');
        }
    }

    combined.push_str(current);
    trim_to_budget(&combined, chunk_size, counter)
}

fn tail_within_limit<'a>(text: &'a str, limit: usize, counter: &SizeCounter) -> &'a str {
    if limit == 0 {
        return "";
    }
    let trimmed_text = text.trim_start();
    if counter.as_ref()(trimmed_text) <= limit {
        return trimmed_text;
    }
    drop_leading_until(text, limit, counter)
}

fn trim_to_budget(text: &str, budget: usize, counter: &SizeCounter) -> String {
    if counter.as_ref()(text) <= budget {
        return text.to_string();
    }
    drop_leading_until(text, budget, counter).to_string()
}

/// Drop leading characters until the remainder fits `limit`.
fn drop_leading_until<'a>(text: &'a str, limit: usize, counter: &SizeCounter) -> &'a str {
    for (offset, _) in text.char_indices().skip(1) {
        let trimmed = text[offset..].trim_start();
        if counter.as_ref()(trimmed) <= limit {
            return trimmed;
        }
    }
    ""
}

fn starts_with_whitespace(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_whitespace(text: &str) -> bool {
    text.chars().next_back().is_some_and(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text() -> String {
        (0..60)
            .map(|i| format!("Sentence number {i} talks about renewable power and markets."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn free_text_chunks_respect_character_budget() {
        let text = sample_text();
        for (size, overlap) in [(200, 0), (200, 40), (1500, 100), (64, 63)] {
            let chunks =
                chunk_document(&LoadedDocument::Text(text.clone()), Vec::new(), size, overlap)
                    .expect("chunks");
            assert!(!chunks.is_empty());
            for chunk in &chunks {
                assert!(char_count(chunk) <= size, "{} > {size}", char_count(chunk));
            }
        }
    }

    #[test]
    fn overlap_carries_previous_tail() {
        let counter = char_counter();
        let chunks = apply_overlap(
            vec!["alpha beta".into(), "gamma delta".into()],
            20,
            4,
            &counter,
        );
        assert_eq!(chunks, vec!["alpha beta", "beta gamma delta"]);
    }

    #[test]
    fn short_records_pass_through_and_long_ones_split() {
        let long_record = "word ".repeat(100);
        let document = LoadedDocument::Records(vec![
            "name: Acme".into(),
            String::new(),
            long_record.clone(),
        ]);
        let chunks = chunk_document(&document, Vec::new(), 120, 0).expect("chunks");
        assert_eq!(chunks[0], "name: Acme");
        assert!(chunks.len() > 2);
        assert!(chunks.iter().all(|chunk| char_count(chunk) <= 120));
    }

    #[test]
    fn tables_are_appended_verbatim() {
        let chunks = chunk_document(
            &LoadedDocument::Text("Short body text.".into()),
            vec!["| a | b |\n| 1 | 2 |".into()],
            1500,
            100,
        )
        .expect("chunks");
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], "| a | b |\n| 1 | 2 |");
    }

    #[test]
    fn unbroken_text_is_hard_split() {
        let text = "x".repeat(1300);
        let chunks =
            chunk_document(&LoadedDocument::Text(text), Vec::new(), 600, 0).expect("chunks");
        assert!(chunks.iter().all(|chunk| char_count(chunk) <= 600));
        assert_eq!(chunks.iter().map(|c| char_count(c)).sum::<usize>(), 1300);
    }

    #[test]
    fn empty_input_and_zero_budget_fail() {
        assert!(matches!(
            chunk_document(&LoadedDocument::Text("  ".into()), Vec::new(), 100, 0),
            Err(ChunkingError::NoChunks)
        ));
        assert!(matches!(
            chunk_document(&LoadedDocument::Text("hello".into()), Vec::new(), 0, 0),
            Err(ChunkingError::InvalidChunkSize)
        ));
    }
}
