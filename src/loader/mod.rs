//! Turning files on disk into text or record lists ready for chunking.
//!
//! Free-text formats (plain text, Markdown, HTML, PDF) load as a single string. Structured
//! formats (CSV, JSON, JSON Lines) load as one record per row or element so the chunker can keep
//! records intact.

use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Errors raised while loading a source document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// File loaded but contained no text.
    #[error("Source {0} loaded to zero length")]
    Empty(PathBuf),
    /// Extension is not handled by this loader.
    #[error("Unsupported file type: {0}")]
    Unsupported(String),
    /// File content could not be parsed for its declared type.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },
}

/// Content produced by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedDocument {
    /// Free text to be split by the recursive splitter.
    Text(String),
    /// Pre-split records (rows or elements) from a structured source.
    Records(Vec<String>),
}

impl LoadedDocument {
    /// Whether the document carries no non-whitespace content.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Records(records) => records.iter().all(|record| record.trim().is_empty()),
        }
    }
}

/// Capability turning a path into loaded content.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the file at `path`.
    async fn load(&self, path: &Path) -> Result<LoadedDocument, LoadError>;
}

/// Optional capability extracting tables from PDF sources as standalone text chunks.
#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// Extract tables from the PDF at `path` using the named strategy.
    async fn extract_tables(&self, path: &Path, strategy: &str) -> Result<Vec<String>, LoadError>;
}

/// Whether `path` names a PDF file.
pub fn is_pdf(path: &Path) -> bool {
    extension(path).as_deref() == Some("pdf")
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Filesystem loader covering the formats handled in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsDocumentLoader;

impl FsDocumentLoader {
    /// Create a loader.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for FsDocumentLoader {
    async fn load(&self, path: &Path) -> Result<LoadedDocument, LoadError> {
        let ext = extension(path).unwrap_or_default();
        let bytes = tokio::fs::read(path).await.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let document = match ext.as_str() {
            "txt" | "md" | "markdown" | "log" | "" => {
                LoadedDocument::Text(String::from_utf8_lossy(&bytes).into_owned())
            }
            "html" | "htm" => LoadedDocument::Text(html_to_text(&String::from_utf8_lossy(&bytes))),
            "pdf" => LoadedDocument::Text(pdf_to_text(path, bytes).await?),
            "csv" => LoadedDocument::Records(csv_records(path, &bytes)?),
            "json" => LoadedDocument::Records(json_records(path, &bytes)?),
            "jsonl" => LoadedDocument::Records(jsonl_records(path, &bytes)?),
            other => return Err(LoadError::Unsupported(other.to_string())),
        };

        if document.is_empty() {
            return Err(LoadError::Empty(path.to_path_buf()));
        }
        tracing::debug!(path = %path.display(), kind = %ext, "Loaded source document");
        Ok(document)
    }
}

/// Table extractor recovering column-aligned blocks from PDF text.
///
/// A run of two or more consecutive lines that split into the same number of cells (at least
/// two) on tabs or wide gaps becomes one table, rendered as pipe-separated rows. Only the `fast`
/// strategy is available in-process.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLayoutTableExtractor;

impl PdfLayoutTableExtractor {
    /// Create an extractor.
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TableExtractor for PdfLayoutTableExtractor {
    async fn extract_tables(&self, path: &Path, strategy: &str) -> Result<Vec<String>, LoadError> {
        if !strategy.eq_ignore_ascii_case("fast") {
            return Err(LoadError::Unsupported(format!("table strategy {strategy}")));
        }
        let bytes = tokio::fs::read(path).await.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let tables = tables_from_text(&pdf_to_text(path, bytes).await?);
        tracing::debug!(path = %path.display(), tables = tables.len(), "Extracted PDF tables");
        Ok(tables)
    }
}

fn table_cells(line: &str) -> Vec<&str> {
    static GAP: OnceLock<Regex> = OnceLock::new();
    let gap = GAP.get_or_init(|| Regex::new(r"\t+| {2,}").expect("valid regex"));
    gap.split(line.trim())
        .filter(|cell| !cell.is_empty())
        .collect()
}

fn flush_table(rows: &mut Vec<Vec<&str>>, tables: &mut Vec<String>) {
    if rows.len() >= 2 {
        let rendered: Vec<String> = rows.iter().map(|cells| cells.join(" | ")).collect();
        tables.push(rendered.join("\n"));
    }
    rows.clear();
}

/// Column-aligned blocks found in extracted PDF text, one string per table.
pub fn tables_from_text(text: &str) -> Vec<String> {
    let mut tables = Vec::new();
    let mut rows: Vec<Vec<&str>> = Vec::new();
    for line in text.lines() {
        let cells = table_cells(line);
        let continues_table = cells.len() >= 2
            && rows
                .first()
                .is_none_or(|header| header.len() == cells.len());
        if !continues_table {
            flush_table(&mut rows, &mut tables);
        }
        if cells.len() >= 2 {
            rows.push(cells);
        }
    }
    flush_table(&mut rows, &mut tables);
    tables
}

fn html_to_text(html: &str) -> String {
    static SCRIPTS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let scripts = SCRIPTS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
    let blank_lines =
        BLANK_LINES.get_or_init(|| Regex::new(r"\n\s*\n+").expect("valid regex"));

    let without_scripts = scripts.replace_all(html, " ");
    let text = tags.replace_all(&without_scripts, "\n");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"");
    blank_lines.replace_all(text.trim(), "\n\n").into_owned()
}

async fn pdf_to_text(path: &Path, bytes: Vec<u8>) -> Result<String, LoadError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|error| LoadError::Parse {
            path: owned.clone(),
            message: error.to_string(),
        })?
        .map_err(|error| LoadError::Parse {
            path: owned,
            message: error.to_string(),
        })
}

fn csv_records(path: &Path, bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let parse_error = |error: csv::Error| LoadError::Parse {
        path: path.to_path_buf(),
        message: error.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(parse_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(parse_error)?;
        let record = row
            .iter()
            .enumerate()
            .map(|(idx, value)| match headers.get(idx) {
                Some(header) if !header.is_empty() => format!("{header}: {value}"),
                _ => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        records.push(record);
    }
    Ok(records)
}

fn json_records(path: &Path, bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|error| LoadError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;
    Ok(match value {
        serde_json::Value::Array(items) => items.iter().map(render_json).collect(),
        other => vec![render_json(&other)],
    })
}

fn jsonl_records(path: &Path, bytes: &[u8]) -> Result<Vec<String>, LoadError> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str::<serde_json::Value>(line)
                .map(|value| render_json(&value))
                .map_err(|error| LoadError::Parse {
                    path: path.to_path_buf(),
                    message: format!("line {}: {error}", line_no + 1),
                })
        })
        .collect()
}

fn render_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("temp file");
        file.write_all(content.as_bytes()).expect("write");
        file
    }

    #[tokio::test]
    async fn loads_plain_text() {
        let file = temp_file(".txt", "Solar panels power the plant.");
        let document = FsDocumentLoader::new()
            .load(file.path())
            .await
            .expect("document");
        assert_eq!(
            document,
            LoadedDocument::Text("Solar panels power the plant.".into())
        );
    }

    #[tokio::test]
    async fn csv_rows_become_records() {
        let file = temp_file(".csv", "name,sector\nAcme,energy\nGlobex,finance\n");
        let document = FsDocumentLoader::new()
            .load(file.path())
            .await
            .expect("document");
        assert_eq!(
            document,
            LoadedDocument::Records(vec![
                "name: Acme\nsector: energy".into(),
                "name: Globex\nsector: finance".into(),
            ])
        );
    }

    #[tokio::test]
    async fn json_arrays_and_lines_become_records() {
        let array = temp_file(".json", r#"["first", {"k": 1}]"#);
        let lines = temp_file(".jsonl", "{\"a\":1}\n\n\"second\"\n");
        let loader = FsDocumentLoader::new();

        assert_eq!(
            loader.load(array.path()).await.expect("array"),
            LoadedDocument::Records(vec!["first".into(), "{\"k\":1}".into()])
        );
        assert_eq!(
            loader.load(lines.path()).await.expect("lines"),
            LoadedDocument::Records(vec!["{\"a\":1}".into(), "second".into()])
        );
    }

    #[tokio::test]
    async fn html_tags_are_stripped() {
        let file = temp_file(
            ".html",
            "<html><head><style>p{}</style></head><body><p>Wind &amp; solar</p></body></html>",
        );
        let document = FsDocumentLoader::new()
            .load(file.path())
            .await
            .expect("document");
        let LoadedDocument::Text(text) = document else {
            panic!("expected text");
        };
        assert!(text.contains("Wind & solar"));
        assert!(!text.contains('<'));
        assert!(!text.contains("p{}"));
    }

    #[tokio::test]
    async fn empty_and_unsupported_sources_fail() {
        let loader = FsDocumentLoader::new();
        let empty = temp_file(".txt", "   \n");
        assert!(matches!(
            loader.load(empty.path()).await,
            Err(LoadError::Empty(_))
        ));

        let sheet = temp_file(".xlsx", "binary");
        assert!(matches!(
            loader.load(sheet.path()).await,
            Err(LoadError::Unsupported(ext)) if ext == "xlsx"
        ));

        assert!(matches!(
            loader.load(Path::new("/definitely/missing.txt")).await,
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn aligned_lines_become_pipe_tables() {
        let text = "Quarterly summary\n\
                    Region    Revenue    Growth\n\
                    North\t120\t4%\n\
                    South    95    2%\n\
                    \n\
                    Closing remarks  follow.";
        assert_eq!(
            tables_from_text(text),
            vec!["Region | Revenue | Growth\nNorth | 120 | 4%\nSouth | 95 | 2%".to_string()]
        );
    }

    #[test]
    fn lone_aligned_line_is_not_a_table() {
        assert!(tables_from_text("Name    Value\nplain prose line").is_empty());
    }

    #[tokio::test]
    async fn unknown_table_strategy_is_unsupported() {
        let error = PdfLayoutTableExtractor::new()
            .extract_tables(Path::new("/nonexistent/report.pdf"), "hi_res")
            .await
            .expect_err("unsupported");
        assert!(matches!(error, LoadError::Unsupported(_)));
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(is_pdf(Path::new("report.PDF")));
        assert!(!is_pdf(Path::new("report.txt")));
    }
}
