//! Text analysis for indexing and querying.
//!
//! The pipeline is deliberately minimal and deterministic: split on
//! whitespace, trim surrounding ASCII punctuation, lowercase. Ingest,
//! `match`, and `phrase` handling all share [`tokenize`] so query text
//! round-trips against indexed text.

/// Tokenize text into lowercased terms.
///
/// Words are produced by whitespace splitting; each word is stripped of
/// leading and trailing ASCII punctuation and lowercased byte-wise.
/// Words that become empty are dropped. No stemming, stopwords, or
/// synonym expansion.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|word| {
            let trimmed = word
                .trim_start_matches(|c: char| c.is_ascii_punctuation())
                .trim_end_matches(|c: char| c.is_ascii_punctuation());
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_ascii_lowercase())
            }
        })
        .collect()
}
