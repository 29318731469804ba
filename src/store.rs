//! In-memory document store with a positional inverted index.
//!
//! The store owns two lock domains: the document map and the index
//! state (postings, field lengths, running totals). Readers take the
//! locks in shared mode, mutators in exclusive mode, and whenever both
//! are needed the document lock is acquired before the index lock —
//! never the reverse.

pub mod aggregations;

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use serde_json::Value;

use crate::analysis::tokenize;
use crate::document::resolve_path;
use crate::error::{AcaciaError, Result};

/// BM25 term-frequency saturation parameter.
pub const DEFAULT_K1: f64 = 1.2;
/// BM25 length-normalization parameter.
pub const DEFAULT_B: f64 = 0.75;

/// A stored document: parsed payload plus its ingest timestamp.
#[derive(Debug)]
pub struct StoredDocument {
    /// Parsed JSON payload.
    pub data: Value,
    /// Milliseconds since epoch at ingest.
    pub index_time: i64,
}

/// One occurrence of a term: document, field path, and the 0-based
/// ordinal of the term within that field's token stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPosition {
    pub doc_id: String,
    pub field: String,
    pub position: u32,
}

/// Positional occurrence record for a term.
///
/// `document_frequency` is the number of distinct document ids present
/// in `positions`.
#[derive(Debug, Clone, Default)]
pub struct PostingsList {
    pub positions: Vec<TermPosition>,
    pub document_frequency: usize,
}

/// Numeric range query parameters.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    pub field: String,
    pub min: f64,
    pub max: f64,
    pub include_min: bool,
    pub include_max: bool,
}

/// Store-level statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub document_count: usize,
    /// Estimated payload bytes (serialized length of every document).
    pub storage_bytes: usize,
    pub unique_terms: usize,
    /// Total number of term positions across the index.
    pub total_terms: usize,
}

#[derive(Debug, Default)]
struct IndexState {
    inverted: AHashMap<String, PostingsList>,
    /// doc id -> field path -> token count at ingest.
    field_lengths: AHashMap<String, AHashMap<String, usize>>,
    total_document_length: u64,
}

/// In-memory document store and inverted index.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: RwLock<AHashMap<String, Arc<StoredDocument>>>,
    index: RwLock<IndexState>,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        DocumentStore::default()
    }

    /// Add or replace a document.
    ///
    /// The payload is parsed first; a parse failure leaves all state
    /// untouched. Re-adding an existing id removes its old index
    /// entries before the new payload is indexed.
    pub fn add_document(&self, doc_id: &str, doc_json: &str) -> Result<()> {
        if doc_id.is_empty() {
            return Err(AcaciaError::invalid_argument("document id must not be empty"));
        }

        let data: Value = serde_json::from_str(doc_json)
            .map_err(|e| AcaciaError::malformed_document(e.to_string()))?;

        let stored = Arc::new(StoredDocument {
            data,
            index_time: chrono::Utc::now().timestamp_millis(),
        });

        let mut documents = self.documents.write();
        let mut index = self.index.write();

        if documents.contains_key(doc_id) {
            remove_from_index(&mut index, doc_id);
        }

        if let Some(obj) = stored.data.as_object() {
            index_json_object(&mut index, doc_id, "", obj);
        }
        documents.insert(doc_id.to_string(), stored);

        Ok(())
    }

    /// Fetch a document by id.
    pub fn get_document(&self, doc_id: &str) -> Option<Arc<StoredDocument>> {
        self.documents.read().get(doc_id).cloned()
    }

    /// Delete a document. Returns whether the id existed.
    pub fn delete_document(&self, doc_id: &str) -> bool {
        let mut documents = self.documents.write();
        if !documents.contains_key(doc_id) {
            return false;
        }

        let mut index = self.index.write();
        remove_from_index(&mut index, doc_id);
        documents.remove(doc_id);
        true
    }

    /// Remove every document and index entry.
    pub fn clear(&self) {
        let mut documents = self.documents.write();
        let mut index = self.index.write();
        documents.clear();
        *index = IndexState::default();
    }

    /// All stored document ids, in map order.
    pub fn all_document_ids(&self) -> Vec<String> {
        self.documents.read().keys().cloned().collect()
    }

    /// Fetch documents for the given ids, skipping missing ones.
    pub fn get_documents(&self, doc_ids: &[String]) -> Vec<(String, Arc<StoredDocument>)> {
        let documents = self.documents.read();
        doc_ids
            .iter()
            .filter_map(|id| documents.get(id).map(|d| (id.clone(), Arc::clone(d))))
            .collect()
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Distinct-document frequency for a term, if indexed.
    pub fn document_frequency(&self, term: &str) -> Option<usize> {
        let index = self.index.read();
        index
            .inverted
            .get(&term.to_ascii_lowercase())
            .map(|p| p.document_frequency)
    }

    /// A snapshot of the posting list for a term, if indexed.
    pub fn postings(&self, term: &str) -> Option<PostingsList> {
        let index = self.index.read();
        index.inverted.get(&term.to_ascii_lowercase()).cloned()
    }

    /// Store statistics.
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();

        {
            let documents = self.documents.read();
            stats.document_count = documents.len();
            stats.storage_bytes = documents.values().map(|d| d.data.to_string().len()).sum();
        }

        let index = self.index.read();
        stats.unique_terms = index.inverted.len();
        stats.total_terms = index.inverted.values().map(|p| p.positions.len()).sum();

        stats
    }

    /// Distinct documents containing a term, optionally restricted to a
    /// field. The input is lowercased before lookup.
    pub fn search_term(&self, term: &str, field: Option<&str>) -> Vec<String> {
        let index = self.index.read();

        let Some(postings) = index.inverted.get(&term.to_ascii_lowercase()) else {
            return Vec::new();
        };

        collect_distinct_docs(postings, field)
    }

    /// BM25 scores per matching document with default parameters.
    pub fn score_bm25(&self, term: &str, field: Option<&str>) -> AHashMap<String, f64> {
        self.score_bm25_with(term, field, DEFAULT_K1, DEFAULT_B)
    }

    /// BM25 scores per matching document.
    ///
    /// `idf = ln(((N - df + 0.5) / (df + 0.5)) + 1)`; term frequency is
    /// the position count of the term in the document (restricted to
    /// `field` when given); document length comes from the field-length
    /// table with a floor of one.
    pub fn score_bm25_with(
        &self,
        term: &str,
        field: Option<&str>,
        k1: f64,
        b: f64,
    ) -> AHashMap<String, f64> {
        let documents = self.documents.read();
        let index = self.index.read();

        let mut scores = AHashMap::new();

        let Some(postings) = index.inverted.get(&term.to_ascii_lowercase()) else {
            return scores;
        };

        let n = documents.len();
        if n == 0 {
            return scores;
        }

        let df = postings.document_frequency as f64;
        let idf = (((n as f64 - df + 0.5) / (df + 0.5)) + 1.0).ln();

        let avgdl = if index.total_document_length > 0 {
            index.total_document_length as f64 / n as f64
        } else {
            1.0
        };

        let mut term_freqs: AHashMap<&str, usize> = AHashMap::new();
        for pos in &postings.positions {
            if field.is_none_or(|f| pos.field == f) {
                *term_freqs.entry(pos.doc_id.as_str()).or_insert(0) += 1;
            }
        }

        for (doc_id, tf) in term_freqs {
            let doc_len = match field {
                Some(f) => index
                    .field_lengths
                    .get(doc_id)
                    .and_then(|fields| fields.get(f))
                    .copied()
                    .unwrap_or(0),
                None => index
                    .field_lengths
                    .get(doc_id)
                    .map(|fields| fields.values().sum())
                    .unwrap_or(0),
            }
            .max(1) as f64;

            let tf = tf as f64;
            let numerator = tf * (k1 + 1.0);
            let denominator = tf + k1 * (1.0 - b + b * (doc_len / avgdl));
            scores.insert(doc_id.to_string(), idf * (numerator / denominator));
        }

        scores
    }

    /// Documents containing the terms as a consecutive phrase.
    ///
    /// Rejects early when any term is absent from the index. A document
    /// matches when some anchor position of the first term has every
    /// subsequent term at `anchor + i` within the same field.
    pub fn search_phrase(&self, terms: &[String], field: Option<&str>) -> Vec<String> {
        if terms.is_empty() {
            return Vec::new();
        }

        let index = self.index.read();

        let mut postings = Vec::with_capacity(terms.len());
        for term in terms {
            match index.inverted.get(&term.to_ascii_lowercase()) {
                Some(p) => postings.push(p),
                None => return Vec::new(),
            }
        }

        // Anchor positions of the first term, per document.
        let mut anchors: AHashMap<&str, Vec<(&str, u32)>> = AHashMap::new();
        for pos in &postings[0].positions {
            if field.is_none_or(|f| pos.field == f) {
                anchors
                    .entry(pos.doc_id.as_str())
                    .or_default()
                    .push((pos.field.as_str(), pos.position));
            }
        }

        let mut matching = Vec::new();
        for (doc_id, starts) in anchors {
            let found = starts.iter().any(|&(anchor_field, start)| {
                postings[1..].iter().enumerate().all(|(offset, list)| {
                    let expected = start + offset as u32 + 1;
                    list.positions.iter().any(|p| {
                        p.doc_id == doc_id && p.field == anchor_field && p.position == expected
                    })
                })
            });
            if found {
                matching.push(doc_id.to_string());
            }
        }

        matching.sort();
        matching
    }

    /// Documents whose numeric value at the query's field path falls in
    /// the range. Scans all documents; non-numeric and absent values
    /// never match.
    pub fn search_range(&self, query: &RangeQuery) -> Vec<String> {
        let documents = self.documents.read();

        let mut matching = Vec::new();
        for (doc_id, stored) in documents.iter() {
            let Some(value) = resolve_path(&stored.data, &query.field) else {
                continue;
            };
            let Some(num) = value.as_f64() else {
                continue;
            };

            let above_min = if query.include_min {
                num >= query.min
            } else {
                num > query.min
            };
            let below_max = if query.include_max {
                num <= query.max
            } else {
                num < query.max
            };

            if above_min && below_max {
                matching.push(doc_id.clone());
            }
        }

        matching.sort();
        matching
    }

    /// Documents containing any term with the given prefix.
    pub fn search_prefix(&self, prefix: &str, field: Option<&str>) -> Vec<String> {
        let lower = prefix.to_ascii_lowercase();
        self.scan_terms(field, |term| term.starts_with(&lower))
    }

    /// Documents containing any term matching the wildcard pattern
    /// (`*` any run, `?` exactly one character).
    pub fn search_wildcard(&self, pattern: &str, field: Option<&str>) -> Vec<String> {
        let lower = pattern.to_ascii_lowercase();
        let pattern_chars: Vec<char> = lower.chars().collect();
        self.scan_terms(field, |term| wildcard_match(term, &pattern_chars))
    }

    /// Documents containing any term within `max_distance` edits of the
    /// query term.
    pub fn search_fuzzy(&self, term: &str, field: Option<&str>, max_distance: u32) -> Vec<String> {
        let lower = term.to_ascii_lowercase();
        let query_chars: Vec<char> = lower.chars().collect();
        self.scan_terms(field, |candidate| {
            levenshtein_within(&query_chars, candidate, max_distance)
        })
    }

    /// Union of documents over all index terms accepted by `predicate`,
    /// deduplicated, field-restricted.
    fn scan_terms<F>(&self, field: Option<&str>, predicate: F) -> Vec<String>
    where
        F: Fn(&str) -> bool,
    {
        let index = self.index.read();

        let mut matching = Vec::new();
        let mut seen = AHashSet::new();

        for (term, postings) in &index.inverted {
            if !predicate(term) {
                continue;
            }
            for pos in &postings.positions {
                if field.is_none_or(|f| pos.field == f) && seen.insert(pos.doc_id.clone()) {
                    matching.push(pos.doc_id.clone());
                }
            }
        }

        matching.sort();
        matching
    }
}

fn collect_distinct_docs(postings: &PostingsList, field: Option<&str>) -> Vec<String> {
    let mut seen = AHashSet::new();
    let mut docs = Vec::new();
    for pos in &postings.positions {
        if field.is_none_or(|f| pos.field == f) && seen.insert(pos.doc_id.as_str()) {
            docs.push(pos.doc_id.clone());
        }
    }
    docs
}

/// Recursively index a JSON object: strings are tokenized under the
/// dotted field path, objects recurse with an extended prefix, arrays
/// index their string elements under the same path. Numbers and
/// booleans stay out of the inverted index but remain reachable for
/// range queries and aggregations.
fn index_json_object(
    index: &mut IndexState,
    doc_id: &str,
    prefix: &str,
    obj: &serde_json::Map<String, Value>,
) {
    for (key, value) in obj {
        let field_name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            Value::String(text) => index_text_field(index, doc_id, &field_name, text),
            Value::Object(nested) => index_json_object(index, doc_id, &field_name, nested),
            Value::Array(items) => {
                for item in items {
                    if let Value::String(text) = item {
                        index_text_field(index, doc_id, &field_name, text);
                    }
                }
            }
            _ => {}
        }
    }
}

fn index_text_field(index: &mut IndexState, doc_id: &str, field: &str, text: &str) {
    let terms = tokenize(text);

    *index
        .field_lengths
        .entry(doc_id.to_string())
        .or_default()
        .entry(field.to_string())
        .or_insert(0) += terms.len();
    index.total_document_length += terms.len() as u64;

    for (position, term) in terms.into_iter().enumerate() {
        let postings = index.inverted.entry(term).or_default();

        // All of one document's appends happen contiguously at the tail
        // (exclusive lock), so checking the last entry suffices to keep
        // document_frequency a distinct-document count.
        if postings.positions.last().map(|p| p.doc_id.as_str()) != Some(doc_id) {
            postings.document_frequency += 1;
        }

        postings.positions.push(TermPosition {
            doc_id: doc_id.to_string(),
            field: field.to_string(),
            position: position as u32,
        });
    }
}

/// Drop every index entry referencing a document: positions, emptied
/// posting lists, field lengths, and the length total.
fn remove_from_index(index: &mut IndexState, doc_id: &str) {
    index.inverted.retain(|_, postings| {
        let before = postings.positions.len();
        postings.positions.retain(|pos| pos.doc_id != doc_id);

        if postings.positions.len() != before {
            let distinct: AHashSet<&str> =
                postings.positions.iter().map(|p| p.doc_id.as_str()).collect();
            postings.document_frequency = distinct.len();
        }

        !postings.positions.is_empty()
    });

    if let Some(fields) = index.field_lengths.remove(doc_id) {
        let removed: usize = fields.values().sum();
        index.total_document_length = index.total_document_length.saturating_sub(removed as u64);
    }
}

/// Wildcard match by dynamic programming: `*` matches any run of
/// characters, `?` exactly one.
fn wildcard_match(text: &str, pattern: &[char]) -> bool {
    let text: Vec<char> = text.chars().collect();
    let (n, m) = (text.len(), pattern.len());

    let mut dp = vec![vec![false; m + 1]; n + 1];
    dp[0][0] = true;

    for j in 1..=m {
        if pattern[j - 1] == '*' {
            dp[0][j] = dp[0][j - 1];
        }
    }

    for i in 1..=n {
        for j in 1..=m {
            dp[i][j] = match pattern[j - 1] {
                '*' => dp[i][j - 1] || dp[i - 1][j],
                '?' => dp[i - 1][j - 1],
                c => c == text[i - 1] && dp[i - 1][j - 1],
            };
        }
    }

    dp[n][m]
}

/// Whether the Levenshtein distance between the strings is at most
/// `max_distance`. Short-circuits on a length difference alone.
fn levenshtein_within(query: &[char], candidate: &str, max_distance: u32) -> bool {
    let candidate: Vec<char> = candidate.chars().collect();
    let (n, m) = (query.len(), candidate.len());

    if n.abs_diff(m) > max_distance as usize {
        return false;
    }

    let mut prev: Vec<u32> = (0..=m as u32).collect();
    let mut curr = vec![0u32; m + 1];

    for i in 1..=n {
        curr[0] = i as u32;
        for j in 1..=m {
            curr[j] = if query[i - 1] == candidate[j - 1] {
                prev[j - 1]
            } else {
                1 + prev[j].min(curr[j - 1]).min(prev[j - 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[m] <= max_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> DocumentStore {
        let store = DocumentStore::new();
        store
            .add_document("a", r#"{"title":"red fox","price":10,"tags":["new"]}"#)
            .unwrap();
        store
            .add_document("b", r#"{"title":"quick brown fox","price":25,"tags":["sale"]}"#)
            .unwrap();
        store
            .add_document("c", r#"{"title":"slow green turtle","price":5,"tags":["new","sale"]}"#)
            .unwrap();
        store
            .add_document("d", r#"{"title":"red fox racing","price":40,"tags":[]}"#)
            .unwrap();
        store
    }

    #[test]
    fn test_add_and_get_document() {
        let store = seeded_store();
        assert_eq!(store.document_count(), 4);

        let doc = store.get_document("a").unwrap();
        assert_eq!(doc.data["title"], "red fox");
        assert!(doc.index_time > 0);

        assert!(store.get_document("zzz").is_none());
    }

    #[test]
    fn test_add_rejects_invalid_input() {
        let store = DocumentStore::new();
        assert!(store.add_document("", r#"{}"#).is_err());
        assert!(store.add_document("x", "not json").is_err());
        // Failed ingest leaves no state behind.
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.stats().unique_terms, 0);
    }

    #[test]
    fn test_readd_replaces_document() {
        let store = seeded_store();
        store
            .add_document("a", r#"{"title":"blue heron","price":11}"#)
            .unwrap();

        assert_eq!(store.document_count(), 4);
        assert!(store.search_term("red", None).contains(&"d".to_string()));
        assert!(!store.search_term("red", None).contains(&"a".to_string()));
        assert_eq!(store.search_term("heron", None), vec!["a"]);
    }

    #[test]
    fn test_delete_document_prunes_index() {
        let store = seeded_store();
        assert!(store.delete_document("b"));
        assert!(!store.delete_document("b"));

        // Terms unique to b are gone entirely.
        assert_eq!(store.document_frequency("quick"), None);
        assert_eq!(store.document_frequency("brown"), None);
        // Shared terms no longer reference b.
        let fox_docs = store.search_term("fox", None);
        assert!(!fox_docs.contains(&"b".to_string()));
        assert_eq!(store.document_frequency("fox"), Some(2));
    }

    #[test]
    fn test_document_frequency_is_distinct_docs() {
        let store = DocumentStore::new();
        store
            .add_document("x", r#"{"title":"fox fox fox","body":"fox"}"#)
            .unwrap();
        store.add_document("y", r#"{"title":"fox"}"#).unwrap();

        let postings = store.postings("fox").unwrap();
        assert_eq!(postings.positions.len(), 5);
        assert_eq!(postings.document_frequency, 2);
    }

    #[test]
    fn test_clear() {
        let store = seeded_store();
        store.clear();
        assert_eq!(store.document_count(), 0);
        assert_eq!(store.stats().unique_terms, 0);
        assert!(store.search_term("fox", None).is_empty());
    }

    #[test]
    fn test_search_term_case_and_field() {
        let store = seeded_store();
        let mut docs = store.search_term("FOX", None);
        docs.sort();
        assert_eq!(docs, vec!["a", "b", "d"]);

        assert_eq!(store.search_term("fox", Some("tags")), Vec::<String>::new());
        let mut titled = store.search_term("fox", Some("title"));
        titled.sort();
        assert_eq!(titled, vec!["a", "b", "d"]);
    }

    #[test]
    fn test_nested_object_indexing() {
        let store = DocumentStore::new();
        store
            .add_document("n", r#"{"vendor":{"address":{"city":"berlin"}}}"#)
            .unwrap();
        assert_eq!(store.search_term("berlin", Some("vendor.address.city")), vec!["n"]);
    }

    #[test]
    fn test_numbers_not_in_inverted_index() {
        let store = seeded_store();
        assert!(store.search_term("10", None).is_empty());
        assert!(store.search_term("25", None).is_empty());
    }

    #[test]
    fn test_bm25_scores() {
        let store = seeded_store();
        let scores = store.score_bm25("fox", Some("title"));

        assert_eq!(scores.len(), 3);
        for score in scores.values() {
            assert!(*score > 0.0);
        }
        // Shortest title scores highest.
        assert!(scores["a"] > scores["b"]);
        assert!(scores["a"] > scores["d"]);
    }

    #[test]
    fn test_bm25_monotonic_in_tf() {
        let store = DocumentStore::new();
        store.add_document("one", r#"{"body":"cat dog cat"}"#).unwrap();
        store.add_document("two", r#"{"body":"cat cat cat"}"#).unwrap();

        let scores = store.score_bm25("cat", Some("body"));
        assert!(scores["two"] > scores["one"]);
    }

    #[test]
    fn test_bm25_absent_term() {
        let store = seeded_store();
        assert!(store.score_bm25("zebra", None).is_empty());
    }

    #[test]
    fn test_phrase_search() {
        let store = seeded_store();
        assert_eq!(
            store.search_phrase(
                &["red".to_string(), "fox".to_string()],
                Some("title")
            ),
            vec!["a", "d"]
        );
        // "brown" and "fox" are consecutive, "quick" and "fox" are not.
        assert_eq!(
            store.search_phrase(
                &["quick".to_string(), "fox".to_string()],
                Some("title")
            ),
            Vec::<String>::new()
        );
        assert_eq!(
            store.search_phrase(
                &["quick".to_string(), "brown".to_string(), "fox".to_string()],
                Some("title")
            ),
            vec!["b"]
        );
    }

    #[test]
    fn test_phrase_rejects_when_term_absent() {
        let store = seeded_store();
        assert_eq!(
            store.search_phrase(&["red".to_string(), "zebra".to_string()], None),
            Vec::<String>::new()
        );
        assert_eq!(store.search_phrase(&[], None), Vec::<String>::new());
    }

    #[test]
    fn test_phrase_requires_same_field() {
        let store = DocumentStore::new();
        store
            .add_document("s", r#"{"head":"red","tail":"fox"}"#)
            .unwrap();
        // Terms in different fields never form a phrase.
        assert_eq!(
            store.search_phrase(&["red".to_string(), "fox".to_string()], None),
            Vec::<String>::new()
        );
    }

    #[test]
    fn test_range_search() {
        let store = seeded_store();
        let query = RangeQuery {
            field: "price".to_string(),
            min: 10.0,
            max: 25.0,
            include_min: true,
            include_max: true,
        };
        assert_eq!(store.search_range(&query), vec!["a", "b"]);

        let exclusive = RangeQuery {
            include_min: false,
            include_max: false,
            ..query
        };
        assert_eq!(store.search_range(&exclusive), Vec::<String>::new());
    }

    #[test]
    fn test_prefix_search() {
        let store = seeded_store();
        let mut docs = store.search_prefix("RE", Some("title"));
        docs.sort();
        assert_eq!(docs, vec!["a", "d"]);

        let mut any = store.search_prefix("s", None);
        any.sort();
        // "slow" in c, "sale" in b and c.
        assert_eq!(any, vec!["b", "c"]);
    }

    #[test]
    fn test_wildcard_search() {
        let store = seeded_store();
        let mut docs = store.search_wildcard("f*x", Some("title"));
        docs.sort();
        assert_eq!(docs, vec!["a", "b", "d"]);

        assert_eq!(store.search_wildcard("t?rtle", None), vec!["c"]);
        assert_eq!(store.search_wildcard("*", Some("tags")).len(), 3);
    }

    #[test]
    fn test_wildcard_match_edges() {
        let p = |s: &str| s.chars().collect::<Vec<_>>();
        assert!(wildcard_match("fox", &p("fox")));
        assert!(wildcard_match("fox", &p("*")));
        assert!(wildcard_match("", &p("*")));
        assert!(!wildcard_match("", &p("?")));
        assert!(wildcard_match("abc", &p("a*c")));
        assert!(!wildcard_match("abc", &p("a*d")));
        assert!(wildcard_match("abc", &p("***abc")));
    }

    #[test]
    fn test_fuzzy_search() {
        let store = seeded_store();
        // "foz" is one edit from "fox".
        let mut docs = store.search_fuzzy("foz", Some("title"), 1);
        docs.sort();
        assert_eq!(docs, vec!["a", "b", "d"]);

        // Zero tolerance means exact only.
        assert_eq!(store.search_fuzzy("foz", Some("title"), 0), Vec::<String>::new());
    }

    #[test]
    fn test_levenshtein_within() {
        let q = |s: &str| s.chars().collect::<Vec<_>>();
        assert!(levenshtein_within(&q("kitten"), "sitting", 3));
        assert!(!levenshtein_within(&q("kitten"), "sitting", 2));
        assert!(levenshtein_within(&q("fox"), "fox", 0));
        // Length difference alone exceeds the allowed distance.
        assert!(!levenshtein_within(&q("fox"), "foxtrot", 2));
    }

    #[test]
    fn test_stats() {
        let store = seeded_store();
        let stats = store.stats();
        assert_eq!(stats.document_count, 4);
        assert!(stats.storage_bytes > 0);
        assert!(stats.unique_terms >= 8);
        assert!(stats.total_terms >= stats.unique_terms);
    }

    #[test]
    fn test_field_length_accounting_on_delete() {
        let store = DocumentStore::new();
        store.add_document("p", r#"{"body":"one two three"}"#).unwrap();
        store.add_document("q", r#"{"body":"four five"}"#).unwrap();

        store.delete_document("p");
        let index = store.index.read();
        assert_eq!(index.total_document_length, 2);
        assert!(!index.field_lengths.contains_key("p"));
    }
}
