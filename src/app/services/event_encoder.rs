//! Multi-hot encoding of delimited free-text categorical fields
//!
//! Expands cells like "Hujan Lebat, Petir" into per-token indicator count
//! columns over a fixed vocabulary extracted from the training corpus.
//! Tokens are split on the literal delimiter, never tokenized
//! semantically: the same surface string always maps to the same column.
//! At inference only columns known from training are retained; unseen
//! tokens are dropped silently because the classifier was never trained
//! on them.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// A fixed, ordered vocabulary of surface tokens for one categorical
/// field, with its split delimiter and feature-column prefix
#[derive(Debug, Clone)]
pub struct EventVocabulary {
    tokens: Vec<String>,
    index: HashMap<String, usize>,
    delimiter: String,
    prefix: String,
}

impl EventVocabulary {
    /// Extract the vocabulary from a training corpus of cells.
    ///
    /// Distinct non-empty tokens are collected and sorted so the derived
    /// column order is stable across runs.
    pub fn fit<'a>(
        cells: impl IntoIterator<Item = &'a str>,
        delimiter: &str,
        prefix: &str,
    ) -> Self {
        let mut distinct = BTreeSet::new();
        for cell in cells {
            for token in cell.split(delimiter) {
                if !token.is_empty() {
                    distinct.insert(token.to_string());
                }
            }
        }

        let tokens: Vec<String> = distinct.into_iter().collect();
        debug!(
            "Fitted vocabulary of {} tokens for prefix '{}'",
            tokens.len(),
            prefix
        );
        Self::from_tokens(tokens, delimiter, prefix)
    }

    /// Rebuild a vocabulary from persisted feature column names.
    ///
    /// Inference uses this to re-derive the exact training-time token set
    /// from the scaler's column list; columns under other prefixes are
    /// ignored.
    pub fn from_columns(columns: &[String], delimiter: &str, prefix: &str) -> Self {
        let tokens: Vec<String> = columns
            .iter()
            .filter_map(|column| column.strip_prefix(prefix))
            .map(str::to_string)
            .collect();
        Self::from_tokens(tokens, delimiter, prefix)
    }

    fn from_tokens(tokens: Vec<String>, delimiter: &str, prefix: &str) -> Self {
        let index = tokens
            .iter()
            .enumerate()
            .map(|(position, token)| (token.clone(), position))
            .collect();
        Self {
            tokens,
            index,
            delimiter: delimiter.to_string(),
            prefix: prefix.to_string(),
        }
    }

    /// Number of indicator columns this vocabulary produces
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Feature column names, in vocabulary order
    pub fn column_names(&self) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| format!("{}{}", self.prefix, token))
            .collect()
    }

    /// Encode one cell into per-token occurrence counts.
    ///
    /// Identical tokens repeated within a cell are counted once each;
    /// tokens outside the vocabulary contribute nothing.
    pub fn encode(&self, cell: Option<&str>) -> Vec<u32> {
        let mut counts = vec![0u32; self.tokens.len()];
        let Some(cell) = cell else {
            return counts;
        };

        for token in cell.split(self.delimiter.as_str()) {
            if let Some(&position) = self.index.get(token) {
                counts[position] += 1;
            }
        }

        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted() -> EventVocabulary {
        let corpus = ["Hujan Lebat, Petir", "Angin Kencang", "Hujan Lebat"];
        EventVocabulary::fit(corpus, ", ", "event_")
    }

    #[test]
    fn vocabulary_is_distinct_and_sorted() {
        let vocab = fitted();
        assert_eq!(
            vocab.column_names(),
            vec!["event_Angin Kencang", "event_Hujan Lebat", "event_Petir"]
        );
    }

    #[test]
    fn encoding_counts_repeated_tokens() {
        let vocab = fitted();
        let counts = vocab.encode(Some("Hujan Lebat, Hujan Lebat, Petir"));
        assert_eq!(counts, vec![0, 2, 1]);
    }

    #[test]
    fn unseen_tokens_are_dropped_silently() {
        let vocab = fitted();
        let counts = vocab.encode(Some("Gempa Bumi, Petir"));
        assert_eq!(counts, vec![0, 0, 1]);
    }

    #[test]
    fn missing_cell_encodes_to_zeros() {
        let vocab = fitted();
        assert_eq!(vocab.encode(None), vec![0, 0, 0]);
    }

    #[test]
    fn rebuilt_vocabulary_matches_training_columns() {
        let vocab = fitted();
        let columns: Vec<String> = vocab
            .column_names()
            .into_iter()
            .chain(["impact_Banjir".to_string()])
            .collect();

        let rebuilt = EventVocabulary::from_columns(&columns, ", ", "event_");
        assert_eq!(rebuilt.column_names(), fitted().column_names());
        assert_eq!(
            rebuilt.encode(Some("Hujan Lebat, Petir")),
            vocab.encode(Some("Hujan Lebat, Petir"))
        );
    }

    #[test]
    fn same_surface_string_always_maps_to_same_column() {
        // literal split only: a token differing by case is a different column
        let vocab = EventVocabulary::fit(["Petir", "petir"], ", ", "event_");
        assert_eq!(vocab.len(), 2);
    }
}
