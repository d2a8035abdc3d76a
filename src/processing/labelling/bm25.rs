use super::{LabelAssignment, Labeller, retain_known};
use crate::labels::LabelSet;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const K1: f64 = 1.5;
const B: f64 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let word = WORD.get_or_init(|| Regex::new(r"\w+").expect("valid regex"));
    word.find_iter(text)
        .map(|token| token.as_str().to_lowercase())
        .collect()
}

/// Okapi BM25 index whose documents are label names.
///
/// Uses the non-negative idf `ln(1 + (N - n + 0.5) / (n + 0.5))` so that terms appearing in
/// half the labels still contribute. Repeated query tokens are scored once per occurrence.
#[derive(Debug, Clone)]
pub struct Bm25Index {
    docs: Vec<HashMap<String, usize>>,
    lengths: Vec<usize>,
    avg_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Index {
    /// Index the tokenized form of each label.
    pub fn new(labels: &[String]) -> Self {
        let docs: Vec<HashMap<String, usize>> = labels
            .iter()
            .map(|label| {
                let mut freqs = HashMap::new();
                for token in tokenize(label) {
                    *freqs.entry(token).or_insert(0) += 1;
                }
                freqs
            })
            .collect();
        let lengths: Vec<usize> = docs.iter().map(|doc| doc.values().sum()).collect();
        let avg_len = if lengths.is_empty() {
            0.0
        } else {
            lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
        };

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in &docs {
            for token in doc.keys() {
                *doc_freq.entry(token.clone()).or_insert(0) += 1;
            }
        }
        let n = docs.len() as f64;
        let idf = doc_freq
            .into_iter()
            .map(|(token, df)| {
                let df = df as f64;
                (token, (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        Self {
            docs,
            lengths,
            avg_len,
            idf,
        }
    }

    /// Score `query` against every indexed label, in label order.
    pub fn scores(&self, query: &str) -> Vec<f64> {
        let tokens = tokenize(query);
        self.docs
            .iter()
            .zip(&self.lengths)
            .map(|(doc, &len)| {
                let norm = if self.avg_len > 0.0 {
                    1.0 - B + B * len as f64 / self.avg_len
                } else {
                    1.0
                };
                tokens
                    .iter()
                    .filter_map(|token| {
                        let freq = *doc.get(token)? as f64;
                        let idf = self.idf.get(token).copied().unwrap_or(0.0);
                        Some(idf * freq * (K1 + 1.0) / (freq + K1 * norm))
                    })
                    .sum()
            })
            .collect()
    }
}

/// Lexical labeller selecting labels whose BM25 score reaches a threshold.
pub struct Bm25Labeller {
    threshold: f64,
}

impl Bm25Labeller {
    /// Labeller accepting scores `>= threshold`.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

#[async_trait]
impl Labeller for Bm25Labeller {
    async fn label(&self, chunks: &[String], labels: &LabelSet) -> LabelAssignment {
        let names = labels.names();
        let index = Bm25Index::new(names);
        let assigned = chunks
            .iter()
            .map(|chunk| {
                let selected = index
                    .scores(chunk)
                    .into_iter()
                    .zip(names)
                    .filter(|(score, _)| *score >= self.threshold)
                    .map(|(_, name)| name.clone())
                    .collect();
                retain_known(selected, labels)
            })
            .collect();
        LabelAssignment {
            labels: assigned,
            degraded: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label_set() -> LabelSet {
        LabelSet::new(["green energy", "business"])
    }

    #[tokio::test]
    async fn selects_only_labels_above_threshold() {
        let chunks = vec![
            "Green energy subsidies expanded. Green energy output rose, and green energy \
             prices fell across the region."
                .to_string(),
            "The weather was mild all week.".to_string(),
        ];
        let assignment = Bm25Labeller::new(2.0).label(&chunks, &label_set()).await;
        assert_eq!(assignment.labels[0], vec!["green energy"]);
        assert!(assignment.labels[1].is_empty());
        assert_eq!(assignment.degraded, 0);
    }

    #[test]
    fn single_mention_stays_below_reference_threshold() {
        let index = Bm25Index::new(label_set().names());
        let scores = index.scores("A business plan.");
        assert!(scores[1] > 0.0);
        assert!(scores[1] < 2.0);
        assert_eq!(scores[0], 0.0);
    }

    #[tokio::test]
    async fn empty_label_set_assigns_nothing() {
        let assignment = Bm25Labeller::new(2.0)
            .label(&["anything".to_string()], &LabelSet::default())
            .await;
        assert_eq!(assignment.labels, vec![Vec::<String>::new()]);
    }
}
