//! Aggregations over candidate document sets.
//!
//! Every aggregation takes the candidate ids produced by query
//! selection plus a field path, and summarizes values found at that
//! path. Numeric aggregations silently skip documents where the field
//! is absent or non-numeric.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::DocumentStore;
use crate::document::resolve_path;

/// One bucket of a terms aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermBucket {
    pub key: String,
    pub doc_count: i64,
}

/// One bucket of a numeric histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub key: f64,
    pub doc_count: i64,
}

/// One bucket of a date histogram. `key` is the bucket's start in
/// milliseconds since epoch, `key_as_string` its ISO-8601 UTC render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateHistogramBucket {
    pub key: i64,
    pub key_as_string: String,
    pub doc_count: i64,
}

/// Result of one named aggregation, in its wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationResult {
    Terms {
        buckets: Vec<TermBucket>,
    },
    Stats {
        count: i64,
        min: f64,
        max: f64,
        avg: f64,
        sum: f64,
    },
    ExtendedStats {
        count: i64,
        min: f64,
        max: f64,
        avg: f64,
        sum: f64,
        sum_of_squares: f64,
        variance: f64,
        std_deviation: f64,
        std_deviation_bounds_upper: f64,
        std_deviation_bounds_lower: f64,
    },
    Histogram {
        buckets: Vec<HistogramBucket>,
    },
    DateHistogram {
        buckets: Vec<DateHistogramBucket>,
    },
    Percentiles {
        values: BTreeMap<String, f64>,
    },
    Cardinality {
        value: i64,
    },
    Avg {
        value: f64,
    },
    Min {
        value: f64,
    },
    Max {
        value: f64,
    },
    Sum {
        value: f64,
    },
    ValueCount {
        value: i64,
    },
}

impl DocumentStore {
    /// Terms aggregation: distinct-document counts per index term found
    /// in the candidate set (restricted to `field` when given), sorted
    /// by count descending then term ascending, truncated to `size`.
    pub fn aggregate_terms(
        &self,
        field: Option<&str>,
        doc_ids: &[String],
        size: usize,
    ) -> Vec<TermBucket> {
        let index = self.index.read();

        let candidates: AHashSet<&str> = doc_ids.iter().map(String::as_str).collect();
        let mut term_docs: AHashMap<&str, AHashSet<&str>> = AHashMap::new();

        for (term, postings) in &index.inverted {
            for pos in &postings.positions {
                if field.is_none_or(|f| pos.field == f) && candidates.contains(pos.doc_id.as_str())
                {
                    term_docs
                        .entry(term.as_str())
                        .or_default()
                        .insert(pos.doc_id.as_str());
                }
            }
        }

        let mut buckets: Vec<TermBucket> = term_docs
            .into_iter()
            .map(|(term, docs)| TermBucket {
                key: term.to_string(),
                doc_count: docs.len() as i64,
            })
            .collect();

        buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
        if size > 0 {
            buckets.truncate(size);
        }
        buckets
    }

    /// Stats aggregation over numeric values at the field path.
    pub fn aggregate_stats(&self, field: &str, doc_ids: &[String]) -> AggregationResult {
        let values = self.numeric_values(field, doc_ids);
        let count = values.len() as i64;

        if count == 0 {
            return AggregationResult::Stats {
                count: 0,
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                sum: 0.0,
            };
        }

        let sum: f64 = values.iter().sum();
        AggregationResult::Stats {
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg: sum / count as f64,
            sum,
        }
    }

    /// Extended stats: stats plus sum-of-squares, variance, standard
    /// deviation, and the ±2σ bounds.
    pub fn aggregate_extended_stats(&self, field: &str, doc_ids: &[String]) -> AggregationResult {
        let values = self.numeric_values(field, doc_ids);
        let count = values.len() as i64;

        if count == 0 {
            return AggregationResult::ExtendedStats {
                count: 0,
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                sum: 0.0,
                sum_of_squares: 0.0,
                variance: 0.0,
                std_deviation: 0.0,
                std_deviation_bounds_upper: 0.0,
                std_deviation_bounds_lower: 0.0,
            };
        }

        let sum: f64 = values.iter().sum();
        let sum_of_squares: f64 = values.iter().map(|v| v * v).sum();
        let avg = sum / count as f64;
        let variance = sum_of_squares / count as f64 - avg * avg;
        let std_deviation = variance.max(0.0).sqrt();

        AggregationResult::ExtendedStats {
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            avg,
            sum,
            sum_of_squares,
            variance,
            std_deviation,
            std_deviation_bounds_upper: avg + 2.0 * std_deviation,
            std_deviation_bounds_lower: avg - 2.0 * std_deviation,
        }
    }

    /// Fixed-width numeric bucketing; bucket key is
    /// `floor(v / interval) * interval`. A non-positive interval yields
    /// no buckets.
    pub fn aggregate_histogram(
        &self,
        field: &str,
        doc_ids: &[String],
        interval: f64,
    ) -> Vec<HistogramBucket> {
        if interval <= 0.0 {
            return Vec::new();
        }

        let values = self.numeric_values(field, doc_ids);
        let mut counts: AHashMap<u64, (f64, i64)> = AHashMap::new();

        for v in values {
            let mut key = (v / interval).floor() * interval;
            if key == 0.0 {
                key = 0.0; // normalize -0.0
            }
            counts.entry(key.to_bits()).or_insert((key, 0)).1 += 1;
        }

        let mut buckets: Vec<HistogramBucket> = counts
            .into_values()
            .map(|(key, doc_count)| HistogramBucket { key, doc_count })
            .collect();
        buckets.sort_by(|a, b| a.key.total_cmp(&b.key));
        buckets
    }

    /// Time bucketing over integer millisecond timestamps. The interval
    /// literal has the form `<int>(ms|s|m|h|d)`; anything unparseable
    /// falls back to one hour.
    pub fn aggregate_date_histogram(
        &self,
        field: &str,
        doc_ids: &[String],
        interval: &str,
    ) -> Vec<DateHistogramBucket> {
        let interval_ms = parse_interval_ms(interval);

        let documents = self.documents.read();
        let mut counts: BTreeMap<i64, i64> = BTreeMap::new();

        for doc_id in doc_ids {
            let Some(stored) = documents.get(doc_id) else {
                continue;
            };
            let Some(ts) = resolve_path(&stored.data, field).and_then(Value::as_i64) else {
                continue;
            };
            let bucket = ts.div_euclid(interval_ms) * interval_ms;
            *counts.entry(bucket).or_insert(0) += 1;
        }

        counts
            .into_iter()
            .map(|(key, doc_count)| DateHistogramBucket {
                key,
                key_as_string: format_utc_millis(key),
                doc_count,
            })
            .collect()
    }

    /// Percentiles by linear interpolation between sorted values.
    /// Percentile ranks outside `[0, 100]` are skipped.
    pub fn aggregate_percentiles(
        &self,
        field: &str,
        doc_ids: &[String],
        percents: &[f64],
    ) -> Vec<(f64, f64)> {
        let mut values = self.numeric_values(field, doc_ids);
        if values.is_empty() {
            return Vec::new();
        }
        values.sort_by(f64::total_cmp);

        let mut result = Vec::with_capacity(percents.len());
        for &p in percents {
            if !(0.0..=100.0).contains(&p) {
                continue;
            }

            let rank = (p / 100.0) * (values.len() - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;

            let value = if lower == upper {
                values[lower]
            } else {
                let fraction = rank - lower as f64;
                values[lower] * (1.0 - fraction) + values[upper] * fraction
            };
            result.push((p, value));
        }
        result
    }

    /// Exact distinct-value count at the field path. Values hash by
    /// their string rendition (strings verbatim, everything else as
    /// compact JSON).
    pub fn aggregate_cardinality(&self, field: &str, doc_ids: &[String]) -> i64 {
        let documents = self.documents.read();
        let mut unique: AHashSet<String> = AHashSet::new();

        for doc_id in doc_ids {
            let Some(stored) = documents.get(doc_id) else {
                continue;
            };
            let Some(value) = resolve_path(&stored.data, field) else {
                continue;
            };
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            unique.insert(rendered);
        }

        unique.len() as i64
    }

    /// Average of numeric values at the field path; zero when none.
    pub fn aggregate_avg(&self, field: &str, doc_ids: &[String]) -> f64 {
        let values = self.numeric_values(field, doc_ids);
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    }

    /// Minimum numeric value at the field path; zero when none.
    pub fn aggregate_min(&self, field: &str, doc_ids: &[String]) -> f64 {
        let values = self.numeric_values(field, doc_ids);
        if values.is_empty() {
            0.0
        } else {
            values.into_iter().fold(f64::INFINITY, f64::min)
        }
    }

    /// Maximum numeric value at the field path; zero when none.
    pub fn aggregate_max(&self, field: &str, doc_ids: &[String]) -> f64 {
        let values = self.numeric_values(field, doc_ids);
        if values.is_empty() {
            0.0
        } else {
            values.into_iter().fold(f64::NEG_INFINITY, f64::max)
        }
    }

    /// Sum of numeric values at the field path.
    pub fn aggregate_sum(&self, field: &str, doc_ids: &[String]) -> f64 {
        self.numeric_values(field, doc_ids).iter().sum()
    }

    /// Count of documents with any non-null value at the field path.
    pub fn aggregate_value_count(&self, field: &str, doc_ids: &[String]) -> i64 {
        let documents = self.documents.read();
        doc_ids
            .iter()
            .filter(|doc_id| {
                documents
                    .get(doc_id.as_str())
                    .and_then(|stored| resolve_path(&stored.data, field))
                    .is_some_and(|v| !v.is_null())
            })
            .count() as i64
    }

    fn numeric_values(&self, field: &str, doc_ids: &[String]) -> Vec<f64> {
        let documents = self.documents.read();
        let mut values = Vec::with_capacity(doc_ids.len());

        for doc_id in doc_ids {
            if let Some(stored) = documents.get(doc_id) {
                if let Some(num) = resolve_path(&stored.data, field).and_then(Value::as_f64) {
                    values.push(num);
                }
            }
        }
        values
    }
}

fn parse_interval_ms(interval: &str) -> i64 {
    const DEFAULT_MS: i64 = 60 * 60 * 1000; // 1h

    let interval = interval.trim();
    let (digits, unit_ms) = if let Some(prefix) = interval.strip_suffix("ms") {
        (prefix, 1)
    } else if let Some(prefix) = interval.strip_suffix('s') {
        (prefix, 1000)
    } else if let Some(prefix) = interval.strip_suffix('m') {
        (prefix, 60 * 1000)
    } else if let Some(prefix) = interval.strip_suffix('h') {
        (prefix, 60 * 60 * 1000)
    } else if let Some(prefix) = interval.strip_suffix('d') {
        (prefix, 24 * 60 * 60 * 1000)
    } else {
        return DEFAULT_MS;
    };

    match digits.parse::<i64>() {
        Ok(n) if n > 0 => n * unit_ms,
        _ => DEFAULT_MS,
    }
}

pub(crate) fn format_utc_millis(millis: i64) -> String {
    chrono::Utc
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_default()
}
