//! Shards: a document store bound to the search pipeline.
//!
//! A shard runs the query dispatcher over its store, applies the
//! optional predicate filter to the selected page, and keeps per-shard
//! counters. Filter evaluation is error tolerant: a document whose
//! evaluation fails is dropped, never the query.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{AcaciaError, Result};
use crate::expression::ExpressionFilter;
use crate::query;
use crate::store::aggregations::AggregationResult;
use crate::store::DocumentStore;

/// Options for a shard search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Number of ranked hits to skip.
    pub from: usize,
    /// Maximum number of hits to return (clamped to at least one).
    pub size: usize,
    /// Binary predicate filter applied to the selected page.
    pub filter: Option<Vec<u8>>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            from: 0,
            size: 10,
            filter: None,
        }
    }
}

/// One returned document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score")]
    pub score: f64,
    #[serde(rename = "_source")]
    pub source: Value,
}

/// The result envelope for a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResult {
    /// Wall-clock duration in milliseconds.
    pub took: u64,
    pub total_hits: u64,
    pub max_score: f64,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregations: BTreeMap<String, AggregationResult>,
}

/// Per-shard statistics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ShardStats {
    pub doc_count: usize,
    pub size_bytes: usize,
    pub search_count: u64,
    pub filter_evaluations: u64,
    pub unique_terms: usize,
    pub total_terms: usize,
}

/// A named partition owning one document store.
#[derive(Debug)]
pub struct Shard {
    path: String,
    store: Arc<DocumentStore>,
    search_count: AtomicU64,
    filter_evaluations: AtomicU64,
}

impl Shard {
    /// Create a shard. The path is an opaque identifier; nothing is
    /// persisted.
    pub fn new(path: impl Into<String>) -> Self {
        Shard {
            path: path.into(),
            store: Arc::new(DocumentStore::new()),
            search_count: AtomicU64::new(0),
            filter_evaluations: AtomicU64::new(0),
        }
    }

    /// The shard's path identifier.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Shared handle to the underlying store, for registration with a
    /// shard manager.
    pub fn store(&self) -> Arc<DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Add or replace a document.
    pub fn index_document(&self, doc_id: &str, doc_json: &str) -> Result<()> {
        self.store.add_document(doc_id, doc_json)
    }

    /// Fetch a document by id.
    pub fn get_document(&self, doc_id: &str) -> Option<Document> {
        self.store.get_document(doc_id).map(|stored| Document {
            id: doc_id.to_string(),
            source: stored.data.clone(),
            score: 0.0,
        })
    }

    /// Fetch a document's payload as a JSON string.
    pub fn get_document_json(&self, doc_id: &str) -> Option<String> {
        self.store
            .get_document(doc_id)
            .map(|stored| stored.data.to_string())
    }

    /// Delete a document. Returns whether the id existed.
    pub fn delete_document(&self, doc_id: &str) -> bool {
        self.store.delete_document(doc_id)
    }

    /// Remove all documents.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Execute a search against this shard.
    pub fn search(&self, query_json: &str, options: &SearchOptions) -> Result<SearchResult> {
        let start = Instant::now();

        let (mut result, filter_evaluations) = run_search(
            &self.store,
            query_json,
            options.filter.as_deref(),
            options.from,
            options.size,
        )?;

        result.took = start.elapsed().as_millis() as u64;
        self.search_count.fetch_add(1, Ordering::Relaxed);
        self.filter_evaluations
            .fetch_add(filter_evaluations, Ordering::Relaxed);

        Ok(result)
    }

    /// Shard statistics.
    pub fn stats(&self) -> ShardStats {
        let store_stats = self.store.stats();
        ShardStats {
            doc_count: store_stats.document_count,
            size_bytes: store_stats.storage_bytes,
            search_count: self.search_count.load(Ordering::Relaxed),
            filter_evaluations: self.filter_evaluations.load(Ordering::Relaxed),
            unique_terms: store_stats.unique_terms,
            total_terms: store_stats.total_terms,
        }
    }
}

/// The search pipeline shared by shards and the distributed
/// coordinator: dispatch, rank, paginate, load, filter.
///
/// Returns the result plus the number of predicate evaluations
/// performed. Filter bytes that fail to decode are logged and skipped,
/// degrading to an unfiltered search.
pub(crate) fn run_search(
    store: &DocumentStore,
    query_json: &str,
    filter: Option<&[u8]>,
    from: usize,
    size: usize,
) -> Result<(SearchResult, u64)> {
    let query: Value =
        serde_json::from_str(query_json).map_err(|e| AcaciaError::query(e.to_string()))?;
    let size = size.max(1);

    let selection = query::select(store, &query)?;
    let aggregations = query::run_aggregations(store, &query, &selection.ids);

    let total_hits = selection.ids.len() as u64;

    // Stable sort: ties keep first-seen insertion order.
    let mut ranked = selection.ids;
    ranked.sort_by(|a, b| {
        let score_a = selection.scores.get(a).copied().unwrap_or(0.0);
        let score_b = selection.scores.get(b).copied().unwrap_or(0.0);
        score_b.total_cmp(&score_a)
    });

    let page: Vec<String> = ranked.into_iter().skip(from).take(size).collect();

    let mut hits: Vec<SearchHit> = store
        .get_documents(&page)
        .into_iter()
        .map(|(id, stored)| {
            let score = selection.scores.get(&id).copied().unwrap_or(0.0);
            SearchHit {
                id,
                score,
                source: stored.data.clone(),
            }
        })
        .collect();

    let mut filter_evaluations = 0;
    let mut filtered = false;
    if let Some(bytes) = filter {
        match ExpressionFilter::from_bytes(bytes) {
            Ok(expression_filter) => {
                hits.retain(|hit| {
                    let doc = Document {
                        id: hit.id.clone(),
                        source: hit.source.clone(),
                        score: hit.score,
                    };
                    expression_filter.matches(&doc)
                });
                filter_evaluations = expression_filter.evaluation_count();
                filtered = true;
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring undecodable predicate filter");
            }
        }
    }

    let total_hits = if filtered { hits.len() as u64 } else { total_hits };

    let max_score = hits.iter().map(|h| h.score).fold(0.0, f64::max);

    Ok((
        SearchResult {
            took: 0,
            total_hits,
            max_score,
            hits,
            aggregations,
        },
        filter_evaluations,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{codec, BinaryOp, DataType, Expr, ExprValue};

    fn seeded_shard() -> Shard {
        let shard = Shard::new("shard-0");
        shard
            .index_document("a", r#"{"title":"red fox","price":10,"tags":["new"]}"#)
            .unwrap();
        shard
            .index_document("b", r#"{"title":"quick brown fox","price":25,"tags":["sale"]}"#)
            .unwrap();
        shard
            .index_document("c", r#"{"title":"slow green turtle","price":5,"tags":["new","sale"]}"#)
            .unwrap();
        shard
            .index_document("d", r#"{"title":"red fox racing","price":40,"tags":[]}"#)
            .unwrap();
        shard
    }

    /// price >= 20 && price <= 40, in wire form.
    fn price_filter_bytes() -> Vec<u8> {
        let cmp = |op, bound: i64| Expr::Binary {
            op,
            result_type: DataType::Bool,
            left: Box::new(Expr::Field {
                path: "price".to_string(),
                dtype: DataType::Float64,
            }),
            right: Box::new(Expr::Const {
                value: ExprValue::Int64(bound),
                dtype: DataType::Int64,
            }),
        };
        codec::encode(&Expr::Binary {
            op: BinaryOp::And,
            result_type: DataType::Bool,
            left: Box::new(cmp(BinaryOp::GreaterEqual, 20)),
            right: Box::new(cmp(BinaryOp::LessEqual, 40)),
        })
    }

    #[test]
    fn test_shard_crud() {
        let shard = seeded_shard();
        assert_eq!(shard.path(), "shard-0");

        let doc = shard.get_document("a").unwrap();
        assert_eq!(doc.id, "a");
        assert_eq!(doc.source["title"], "red fox");

        let json = shard.get_document_json("a").unwrap();
        assert!(json.contains("red fox"));

        assert!(shard.delete_document("a"));
        assert!(!shard.delete_document("a"));
        assert!(shard.get_document("a").is_none());
    }

    #[test]
    fn test_search_ranks_and_paginates() {
        let shard = seeded_shard();

        let result = shard
            .search(r#"{"term":{"title":"fox"}}"#, &SearchOptions::default())
            .unwrap();
        assert_eq!(result.total_hits, 3);
        assert_eq!(result.hits.len(), 3);
        assert_eq!(result.hits[0].id, "a");
        assert!(result.max_score >= result.hits[0].score);
        assert!(result.hits.windows(2).all(|w| w[0].score >= w[1].score));

        let page = shard
            .search(
                r#"{"term":{"title":"fox"}}"#,
                &SearchOptions {
                    from: 1,
                    size: 1,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(page.total_hits, 3);
        assert_eq!(page.hits.len(), 1);
    }

    #[test]
    fn test_search_hit_envelope() {
        let shard = seeded_shard();
        let result = shard
            .search(r#"{"phrase":{"title":"red fox"}}"#, &SearchOptions::default())
            .unwrap();

        let rendered = serde_json::to_value(&result).unwrap();
        assert!(rendered.get("took").is_some());
        assert_eq!(rendered["total_hits"], 2);
        let hit = &rendered["hits"][0];
        assert!(hit.get("_id").is_some());
        assert!(hit.get("_score").is_some());
        assert!(hit["_source"].get("title").is_some());
        // No aggregations requested, so the key is absent.
        assert!(rendered.get("aggregations").is_none());
    }

    #[test]
    fn test_search_with_predicate_filter() {
        let shard = seeded_shard();
        let options = SearchOptions {
            filter: Some(price_filter_bytes()),
            ..Default::default()
        };

        let result = shard.search(r#"{"match_all":{}}"#, &options).unwrap();
        let mut ids: Vec<&str> = result.hits.iter().map(|h| h.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "d"]);
        assert_eq!(result.total_hits, 2);

        let stats = shard.stats();
        assert_eq!(stats.filter_evaluations, 4);
        assert_eq!(stats.search_count, 1);
    }

    #[test]
    fn test_search_with_undecodable_filter_degrades() {
        let shard = seeded_shard();
        let options = SearchOptions {
            filter: Some(vec![0xff, 0x00]),
            ..Default::default()
        };

        let result = shard.search(r#"{"match_all":{}}"#, &options).unwrap();
        assert_eq!(result.total_hits, 4);
        assert_eq!(shard.stats().filter_evaluations, 0);
    }

    #[test]
    fn test_search_rejects_malformed_query() {
        let shard = seeded_shard();
        assert!(shard.search("not json", &SearchOptions::default()).is_err());
    }

    #[test]
    fn test_size_clamped_to_one() {
        let shard = seeded_shard();
        let result = shard
            .search(
                r#"{"match_all":{}}"#,
                &SearchOptions {
                    from: 0,
                    size: 0,
                    filter: None,
                },
            )
            .unwrap();
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.total_hits, 4);
    }

    #[test]
    fn test_stats_reflect_store() {
        let shard = seeded_shard();
        let stats = shard.stats();
        assert_eq!(stats.doc_count, 4);
        assert!(stats.size_bytes > 0);
        assert!(stats.unique_terms > 0);
        assert!(stats.total_terms >= stats.unique_terms);
    }
}
