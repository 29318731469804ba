//! Parallel fan-out search across local shards with ranked merging.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use ahash::AHashMap;
use rayon::prelude::*;

use crate::cluster::manager::ShardManager;
use crate::error::Result;
use crate::shard::{run_search, SearchHit, SearchResult};
use crate::store::aggregations::{
    format_utc_millis, AggregationResult, HistogramBucket, TermBucket,
};

/// Default bucket cap when merging terms aggregations across shards.
const MERGED_TERMS_SIZE: usize = 10;

struct ShardOutcome {
    shard_index: usize,
    latency_ms: u64,
    result: Result<SearchResult>,
}

/// Fans a query out to every targeted local shard in parallel and
/// merges the ranked results.
///
/// A failing shard contributes no hits and is logged; it never aborts
/// the query.
#[derive(Debug)]
pub struct DistributedCoordinator {
    manager: Arc<ShardManager>,
}

impl DistributedCoordinator {
    pub fn new(manager: Arc<ShardManager>) -> Self {
        DistributedCoordinator { manager }
    }

    /// The shard manager backing this coordinator.
    pub fn manager(&self) -> &Arc<ShardManager> {
        &self.manager
    }

    /// Execute a distributed search.
    ///
    /// Each shard is searched with `from = 0` and an oversized window of
    /// `(from + size) × |shards|` so the global top-K survives the
    /// score-based merge.
    pub fn search(
        &self,
        query_json: &str,
        filter: Option<&[u8]>,
        from: usize,
        size: usize,
    ) -> SearchResult {
        let size = size.max(1);

        let targets = self.manager.shards_for_query(query_json);
        let locals = self.manager.local_shards();
        let to_query: Vec<usize> = targets
            .into_iter()
            .filter(|index| locals.binary_search(index).is_ok())
            .collect();

        if to_query.is_empty() {
            return SearchResult::default();
        }

        let shard_window = (from + size) * to_query.len();

        let outcomes: Vec<ShardOutcome> = to_query
            .par_iter()
            .map(|&shard_index| self.search_shard(shard_index, query_json, filter, shard_window))
            .collect();

        merge_results(&outcomes, from, size)
    }

    fn search_shard(
        &self,
        shard_index: usize,
        query_json: &str,
        filter: Option<&[u8]>,
        window: usize,
    ) -> ShardOutcome {
        let start = Instant::now();

        let result = match self.manager.shard_store(shard_index) {
            Some(store) => {
                run_search(&store, query_json, filter, 0, window).map(|(result, _)| result)
            }
            None => Err(crate::error::AcaciaError::shard(format!(
                "shard {shard_index} is not registered locally"
            ))),
        };

        ShardOutcome {
            shard_index,
            latency_ms: start.elapsed().as_millis() as u64,
            result,
        }
    }
}

fn merge_results(outcomes: &[ShardOutcome], from: usize, size: usize) -> SearchResult {
    let mut merged = SearchResult::default();
    let mut all_hits: Vec<&SearchHit> = Vec::new();

    for outcome in outcomes {
        match &outcome.result {
            Ok(result) => {
                merged.total_hits += result.total_hits;
                merged.max_score = merged.max_score.max(result.max_score);
                merged.took = merged.took.max(outcome.latency_ms);
                all_hits.extend(result.hits.iter());
            }
            Err(e) => {
                tracing::warn!(shard = outcome.shard_index, error = %e, "shard search failed");
            }
        }
    }

    // Stable: equal scores keep shard-index-then-shard-rank order.
    all_hits.sort_by(|a, b| b.score.total_cmp(&a.score));

    merged.hits = all_hits
        .into_iter()
        .skip(from)
        .take(size)
        .cloned()
        .collect();

    merged.aggregations = merge_aggregations(outcomes);
    merged
}

/// Reduce per-shard aggregations grouped by name.
///
/// Each kind merges by its natural monoid (summed counts, extreme
/// min/max, recomputed derived values). Averages and percentiles are
/// not reconstructible from the envelope alone; the first shard's
/// result stands.
fn merge_aggregations(outcomes: &[ShardOutcome]) -> BTreeMap<String, AggregationResult> {
    let mut groups: BTreeMap<&str, Vec<&AggregationResult>> = BTreeMap::new();
    for outcome in outcomes {
        if let Ok(result) = &outcome.result {
            for (name, agg) in &result.aggregations {
                groups.entry(name).or_default().push(agg);
            }
        }
    }

    groups
        .into_iter()
        .map(|(name, aggs)| (name.to_string(), merge_group(&aggs)))
        .collect()
}

fn merge_group(aggs: &[&AggregationResult]) -> AggregationResult {
    if aggs.len() == 1 {
        return aggs[0].clone();
    }

    match aggs[0] {
        AggregationResult::Terms { .. } => {
            let mut counts: AHashMap<&str, i64> = AHashMap::new();
            for agg in aggs {
                if let AggregationResult::Terms { buckets } = agg {
                    for bucket in buckets {
                        *counts.entry(bucket.key.as_str()).or_insert(0) += bucket.doc_count;
                    }
                }
            }
            let mut buckets: Vec<TermBucket> = counts
                .into_iter()
                .map(|(key, doc_count)| TermBucket {
                    key: key.to_string(),
                    doc_count,
                })
                .collect();
            buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
            buckets.truncate(MERGED_TERMS_SIZE);
            AggregationResult::Terms { buckets }
        }

        AggregationResult::Stats { .. } => {
            let mut count = 0;
            let mut sum = 0.0;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for agg in aggs {
                if let AggregationResult::Stats {
                    count: c,
                    min: mn,
                    max: mx,
                    sum: s,
                    ..
                } = agg
                {
                    if *c == 0 {
                        continue;
                    }
                    count += c;
                    sum += s;
                    min = min.min(*mn);
                    max = max.max(*mx);
                }
            }
            if count == 0 {
                return AggregationResult::Stats {
                    count: 0,
                    min: 0.0,
                    max: 0.0,
                    avg: 0.0,
                    sum: 0.0,
                };
            }
            AggregationResult::Stats {
                count,
                min,
                max,
                avg: sum / count as f64,
                sum,
            }
        }

        AggregationResult::ExtendedStats { .. } => {
            let mut count = 0;
            let mut sum = 0.0;
            let mut sum_of_squares = 0.0;
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            for agg in aggs {
                if let AggregationResult::ExtendedStats {
                    count: c,
                    min: mn,
                    max: mx,
                    sum: s,
                    sum_of_squares: ss,
                    ..
                } = agg
                {
                    if *c == 0 {
                        continue;
                    }
                    count += c;
                    sum += s;
                    sum_of_squares += ss;
                    min = min.min(*mn);
                    max = max.max(*mx);
                }
            }
            if count == 0 {
                return aggs[0].clone();
            }
            let avg = sum / count as f64;
            let variance = sum_of_squares / count as f64 - avg * avg;
            let std_deviation = variance.max(0.0).sqrt();
            AggregationResult::ExtendedStats {
                count,
                min,
                max,
                avg,
                sum,
                sum_of_squares,
                variance,
                std_deviation,
                std_deviation_bounds_upper: avg + 2.0 * std_deviation,
                std_deviation_bounds_lower: avg - 2.0 * std_deviation,
            }
        }

        AggregationResult::Histogram { .. } => {
            let mut counts: AHashMap<u64, (f64, i64)> = AHashMap::new();
            for agg in aggs {
                if let AggregationResult::Histogram { buckets } = agg {
                    for bucket in buckets {
                        counts.entry(bucket.key.to_bits()).or_insert((bucket.key, 0)).1 +=
                            bucket.doc_count;
                    }
                }
            }
            let mut buckets: Vec<HistogramBucket> = counts
                .into_values()
                .map(|(key, doc_count)| HistogramBucket { key, doc_count })
                .collect();
            buckets.sort_by(|a, b| a.key.total_cmp(&b.key));
            AggregationResult::Histogram { buckets }
        }

        AggregationResult::DateHistogram { .. } => {
            let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
            for agg in aggs {
                if let AggregationResult::DateHistogram { buckets } = agg {
                    for bucket in buckets {
                        *counts.entry(bucket.key).or_insert(0) += bucket.doc_count;
                    }
                }
            }
            AggregationResult::DateHistogram {
                buckets: counts
                    .into_iter()
                    .map(|(key, doc_count)| crate::store::aggregations::DateHistogramBucket {
                        key,
                        key_as_string: format_utc_millis(key),
                        doc_count,
                    })
                    .collect(),
            }
        }

        AggregationResult::Sum { .. } => AggregationResult::Sum {
            value: aggs
                .iter()
                .filter_map(|a| match a {
                    AggregationResult::Sum { value } => Some(*value),
                    _ => None,
                })
                .sum(),
        },

        AggregationResult::ValueCount { .. } => AggregationResult::ValueCount {
            value: aggs
                .iter()
                .filter_map(|a| match a {
                    AggregationResult::ValueCount { value } => Some(*value),
                    _ => None,
                })
                .sum(),
        },

        AggregationResult::Cardinality { .. } => AggregationResult::Cardinality {
            value: aggs
                .iter()
                .filter_map(|a| match a {
                    AggregationResult::Cardinality { value } => Some(*value),
                    _ => None,
                })
                .sum(),
        },

        AggregationResult::Min { .. } => AggregationResult::Min {
            value: aggs
                .iter()
                .filter_map(|a| match a {
                    AggregationResult::Min { value } => Some(*value),
                    _ => None,
                })
                .fold(f64::INFINITY, f64::min),
        },

        AggregationResult::Max { .. } => AggregationResult::Max {
            value: aggs
                .iter()
                .filter_map(|a| match a {
                    AggregationResult::Max { value } => Some(*value),
                    _ => None,
                })
                .fold(f64::NEG_INFINITY, f64::max),
        },

        AggregationResult::Avg { .. } | AggregationResult::Percentiles { .. } => aggs[0].clone(),
    }
}
