//! JSON query DSL dispatcher.
//!
//! Translates a query object into document-store operations, producing
//! an insertion-ordered candidate list plus a score map. `bool` queries
//! compose recursively through [`select`]; aggregation blocks are
//! computed over the full candidate set before any pagination.
//!
//! Recognized top-level forms: `match_all`, `term`, `match`, `phrase`,
//! `range`, `prefix`, `wildcard`, `fuzzy`, `bool`. Unknown forms fall
//! back to match-all — a compatibility contract, not an error.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use serde_json::{Map, Value};

use crate::analysis::tokenize;
use crate::error::Result;
use crate::store::aggregations::AggregationResult;
use crate::store::{DocumentStore, RangeQuery};

/// Candidate documents selected by a query: ids in first-seen order
/// (which the stable score sort uses for ties) plus per-document scores.
#[derive(Debug, Default)]
pub(crate) struct Selection {
    pub ids: Vec<String>,
    pub scores: AHashMap<String, f64>,
}

/// Builder that keeps ids deduplicated in first-seen order.
#[derive(Debug, Default)]
struct SelectionBuilder {
    ids: Vec<String>,
    seen: AHashSet<String>,
    scores: AHashMap<String, f64>,
}

impl SelectionBuilder {
    /// Add a candidate, summing its score into any existing entry.
    fn add(&mut self, id: &str, score: f64) {
        *self.scores.entry(id.to_string()).or_insert(0.0) += score;
        if self.seen.insert(id.to_string()) {
            self.ids.push(id.to_string());
        }
    }

    /// Add a candidate with a fixed score (later adds do not stack).
    fn put(&mut self, id: &str, score: f64) {
        self.scores.insert(id.to_string(), score);
        if self.seen.insert(id.to_string()) {
            self.ids.push(id.to_string());
        }
    }

    fn build(self) -> Selection {
        Selection {
            ids: self.ids,
            scores: self.scores,
        }
    }
}

/// Execute a query object against a store.
pub(crate) fn select(store: &DocumentStore, query: &Value) -> Result<Selection> {
    let Some(query_obj) = query.as_object() else {
        return Ok(Selection::default());
    };

    if let Some(bool_query) = query_obj.get("bool").and_then(Value::as_object) {
        return select_bool(store, bool_query);
    }

    let mut builder = SelectionBuilder::default();

    if query_obj.contains_key("match_all") {
        select_match_all(store, &mut builder);
    } else if let Some(fields) = query_obj.get("term").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(term) = value.as_str() else { continue };
            for (doc_id, score) in sorted_scores(store.score_bm25(term, Some(field))) {
                builder.add(&doc_id, score);
            }
        }
    } else if let Some(fields) = query_obj.get("match").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(text) = value.as_str() else { continue };
            for term in tokenize(text) {
                for (doc_id, score) in sorted_scores(store.score_bm25(&term, Some(field))) {
                    builder.add(&doc_id, score);
                }
            }
        }
    } else if let Some(fields) = query_obj.get("phrase").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(text) = value.as_str() else { continue };
            for doc_id in store.search_phrase(&tokenize(text), Some(field)) {
                builder.put(&doc_id, 2.0);
            }
        }
    } else if let Some(fields) = query_obj.get("range").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(params) = value.as_object() else { continue };
            let range = range_from_params(field, params);
            for doc_id in store.search_range(&range) {
                builder.put(&doc_id, 1.0);
            }
        }
    } else if let Some(fields) = query_obj.get("prefix").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(prefix) = value.as_str() else { continue };
            for doc_id in store.search_prefix(prefix, Some(field)) {
                builder.put(&doc_id, 1.0);
            }
        }
    } else if let Some(fields) = query_obj.get("wildcard").and_then(Value::as_object) {
        for (field, value) in fields {
            let Some(pattern) = value.as_str() else { continue };
            for doc_id in store.search_wildcard(pattern, Some(field)) {
                builder.put(&doc_id, 1.0);
            }
        }
    } else if let Some(fields) = query_obj.get("fuzzy").and_then(Value::as_object) {
        for (field, value) in fields {
            let (term, fuzziness) = match value {
                Value::String(s) => (s.clone(), 2u32),
                Value::Object(params) => {
                    let Some(term) = params.get("value").and_then(Value::as_str) else {
                        continue;
                    };
                    let fuzziness = params
                        .get("fuzziness")
                        .and_then(Value::as_i64)
                        .map(|f| f.max(0) as u32)
                        .unwrap_or(2);
                    (term.to_string(), fuzziness)
                }
                _ => continue,
            };

            let score = 1.0 - 0.2 * fuzziness as f64;
            for doc_id in store.search_fuzzy(&term, Some(field), fuzziness) {
                builder.put(&doc_id, score);
            }
        }
    } else {
        // Unknown query forms fall back to match-all.
        select_match_all(store, &mut builder);
    }

    Ok(builder.build())
}

fn select_match_all(store: &DocumentStore, builder: &mut SelectionBuilder) {
    let mut ids = store.all_document_ids();
    ids.sort();
    for doc_id in ids {
        builder.put(&doc_id, 1.0);
    }
}

/// Boolean composition: intersect `must`, union `should`, exclude
/// `must_not`, then intersect `filter` clauses without scoring. The
/// working set is the `must` intersection when non-empty, otherwise the
/// `should` union.
fn select_bool(store: &DocumentStore, bool_query: &Map<String, Value>) -> Result<Selection> {
    let mut scores: AHashMap<String, f64> = AHashMap::new();

    // must: intersection across clauses, scores summed.
    let mut must_docs: Option<Vec<String>> = None;
    for clause in clause_list(bool_query, "must") {
        let clause_selection = select(store, clause)?;
        for (id, score) in &clause_selection.scores {
            *scores.entry(id.clone()).or_insert(0.0) += score;
        }

        must_docs = Some(match must_docs {
            None => clause_selection.ids,
            Some(previous) => {
                let clause_set: AHashSet<&str> =
                    clause_selection.ids.iter().map(String::as_str).collect();
                previous
                    .into_iter()
                    .filter(|id| clause_set.contains(id.as_str()))
                    .collect()
            }
        });
    }

    // should: union across clauses, scores summed.
    let mut should_docs: Vec<String> = Vec::new();
    let mut should_seen: AHashSet<String> = AHashSet::new();
    for clause in clause_list(bool_query, "should") {
        let clause_selection = select(store, clause)?;
        for (id, score) in &clause_selection.scores {
            *scores.entry(id.clone()).or_insert(0.0) += score;
        }
        for id in clause_selection.ids {
            if should_seen.insert(id.clone()) {
                should_docs.push(id);
            }
        }
    }

    // must_not: union into an exclusion set.
    let mut excluded: AHashSet<String> = AHashSet::new();
    for clause in clause_list(bool_query, "must_not") {
        excluded.extend(select(store, clause)?.ids);
    }

    let working = match must_docs {
        Some(docs) if !docs.is_empty() => docs,
        _ => should_docs,
    };

    let mut ids: Vec<String> = working
        .into_iter()
        .filter(|id| !excluded.contains(id))
        .collect();

    // filter: intersect without contributing scores.
    for clause in clause_list(bool_query, "filter") {
        let clause_set: AHashSet<String> = select(store, clause)?.ids.into_iter().collect();
        ids.retain(|id| clause_set.contains(id));
    }

    let kept: AHashSet<String> = ids.iter().cloned().collect();
    scores.retain(|id, _| kept.contains(id));
    Ok(Selection { ids, scores })
}

fn clause_list<'a>(bool_query: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    bool_query
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Compute the aggregation block (under `aggs` or `aggregations`) over
/// the full candidate set. Entries with unusable definitions are
/// skipped rather than failing the query.
pub(crate) fn run_aggregations(
    store: &DocumentStore,
    query: &Value,
    candidate_ids: &[String],
) -> BTreeMap<String, AggregationResult> {
    let mut results = BTreeMap::new();

    let Some(aggs) = query
        .get("aggs")
        .or_else(|| query.get("aggregations"))
        .and_then(Value::as_object)
    else {
        return results;
    };

    for (name, definition) in aggs {
        let Some(def) = definition.as_object() else {
            continue;
        };
        if let Some(result) = run_one_aggregation(store, def, candidate_ids) {
            results.insert(name.clone(), result);
        }
    }

    results
}

fn run_one_aggregation(
    store: &DocumentStore,
    def: &Map<String, Value>,
    ids: &[String],
) -> Option<AggregationResult> {
    let field_of = |params: &Value| -> Option<String> {
        params.get("field")?.as_str().map(str::to_string)
    };

    if let Some(params) = def.get("terms") {
        let field = field_of(params)?;
        let size = params
            .get("size")
            .and_then(Value::as_u64)
            .map(|s| s as usize)
            .unwrap_or(10);
        return Some(AggregationResult::Terms {
            buckets: store.aggregate_terms(Some(&field), ids, size),
        });
    }
    if let Some(params) = def.get("stats") {
        return Some(store.aggregate_stats(&field_of(params)?, ids));
    }
    if let Some(params) = def.get("extended_stats") {
        return Some(store.aggregate_extended_stats(&field_of(params)?, ids));
    }
    if let Some(params) = def.get("histogram") {
        let field = field_of(params)?;
        let interval = params.get("interval").and_then(Value::as_f64)?;
        return Some(AggregationResult::Histogram {
            buckets: store.aggregate_histogram(&field, ids, interval),
        });
    }
    if let Some(params) = def.get("date_histogram") {
        let field = field_of(params)?;
        let interval = params
            .get("interval")
            .and_then(Value::as_str)
            .unwrap_or("1h");
        return Some(AggregationResult::DateHistogram {
            buckets: store.aggregate_date_histogram(&field, ids, interval),
        });
    }
    if let Some(params) = def.get("percentiles") {
        let field = field_of(params)?;
        let percents: Vec<f64> = params
            .get("percents")
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_else(|| vec![50.0, 95.0, 99.0]);

        let values = store
            .aggregate_percentiles(&field, ids, &percents)
            .into_iter()
            .map(|(p, v)| (p.to_string(), v))
            .collect();
        return Some(AggregationResult::Percentiles { values });
    }
    if let Some(params) = def.get("cardinality") {
        return Some(AggregationResult::Cardinality {
            value: store.aggregate_cardinality(&field_of(params)?, ids),
        });
    }
    if let Some(params) = def.get("avg") {
        return Some(AggregationResult::Avg {
            value: store.aggregate_avg(&field_of(params)?, ids),
        });
    }
    if let Some(params) = def.get("min") {
        return Some(AggregationResult::Min {
            value: store.aggregate_min(&field_of(params)?, ids),
        });
    }
    if let Some(params) = def.get("max") {
        return Some(AggregationResult::Max {
            value: store.aggregate_max(&field_of(params)?, ids),
        });
    }
    if let Some(params) = def.get("sum") {
        return Some(AggregationResult::Sum {
            value: store.aggregate_sum(&field_of(params)?, ids),
        });
    }
    if let Some(params) = def.get("value_count") {
        return Some(AggregationResult::ValueCount {
            value: store.aggregate_value_count(&field_of(params)?, ids),
        });
    }

    None
}

fn range_from_params(field: &str, params: &Map<String, Value>) -> RangeQuery {
    let bound = |key: &str| params.get(key).and_then(Value::as_f64);

    RangeQuery {
        field: field.to_string(),
        min: bound("gte").or_else(|| bound("gt")).unwrap_or(f64::NEG_INFINITY),
        max: bound("lte").or_else(|| bound("lt")).unwrap_or(f64::INFINITY),
        include_min: params.contains_key("gte"),
        include_max: params.contains_key("lte"),
    }
}

/// Score-map entries in deterministic (doc id) order.
fn sorted_scores(scores: AHashMap<String, f64>) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = scores.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}
