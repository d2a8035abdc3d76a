//! Cheap garbage filter applied to chunks before any external call is made.
//!
//! Corrupted PDF text and saved web archives tend to produce chunks full of MIME headers and
//! base64 payloads. A document whose chunks are mostly like that is rejected outright.

/// Minimum share of valid chunks required to continue ingesting a document.
pub const MIN_VALID_RATIO: f64 = 0.2;

const MAX_PROBLEMATIC_LINE_RATIO: f64 = 0.5;
const MIN_READABLE_RATIO: f64 = 0.7;
const LONG_LINE_CHARS: usize = 50;

/// Outcome of validating a document's chunks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSummary {
    /// Chunks that passed [`is_valid_content`].
    pub valid: usize,
    /// All chunks inspected.
    pub total: usize,
}

impl ValidationSummary {
    /// Share of valid chunks; zero for an empty document.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64
        }
    }

    /// Whether the document clears [`MIN_VALID_RATIO`].
    pub fn passes(&self) -> bool {
        self.ratio() >= MIN_VALID_RATIO
    }
}

/// Count valid chunks.
pub fn validate_chunks(chunks: &[String]) -> ValidationSummary {
    ValidationSummary {
        valid: chunks.iter().filter(|chunk| is_valid_content(chunk)).count(),
        total: chunks.len(),
    }
}

/// Heuristic check that a chunk is readable prose rather than encoded or archive residue.
pub fn is_valid_content(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let lines: Vec<&str> = text.lines().collect();
    if !lines.is_empty() {
        let problematic = lines.iter().filter(|line| is_problematic_line(line)).count();
        if problematic as f64 / lines.len() as f64 > MAX_PROBLEMATIC_LINE_RATIO {
            return false;
        }
    }

    let total = text.chars().count();
    let readable = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    readable as f64 / total as f64 >= MIN_READABLE_RATIO
}

fn is_problematic_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("//")
        || line.to_lowercase().contains("base64")
        || line.contains("MIME-Version")
        || line.contains("Content-Type:")
        || line.contains("Content-Transfer-Encoding")
        || line.starts_with("------=_NextPart_")
        || is_base64_run(line)
}

fn is_base64_run(line: &str) -> bool {
    if line.chars().count() <= LONG_LINE_CHARS {
        return false;
    }
    let mut stripped = line
        .chars()
        .filter(|c| !matches!(c, '+' | '/' | '='))
        .peekable();
    stripped.peek().is_some() && stripped.all(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prose_is_valid() {
        assert!(is_valid_content(
            "Wind farms in the North Sea supplied a record share of power last winter."
        ));
    }

    #[test]
    fn mime_headers_and_base64_are_invalid() {
        let archive = "MIME-Version: 1.0\nContent-Type: multipart/related\n\
                       Content-Transfer-Encoding: base64\n\
                       R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7AAAAAAAAAAAAAAAA\n\
                       Hello";
        assert!(!is_valid_content(archive));
    }

    #[test]
    fn symbol_soup_is_invalid() {
        assert!(!is_valid_content("%%$$##@@!!^^&&**(())[]{}<>~~``||"));
        assert!(!is_valid_content(""));
    }

    #[test]
    fn ratio_gate_uses_twenty_percent_floor() {
        let mut chunks = vec!["Readable sentence about markets.".to_string()];
        chunks.extend(std::iter::repeat_n("@@@@####$$$$%%%%".to_string(), 4));
        let summary = validate_chunks(&chunks);
        assert_eq!(summary.valid, 1);
        assert!(summary.passes());

        chunks.push("&&&&****((((".into());
        assert!(!validate_chunks(&chunks).passes());
    }
}
