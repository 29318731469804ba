//! Predicate filter wrapper around a decoded expression tree.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::Document;
use crate::error::Result;
use crate::expression::{codec, Expr};

/// A compiled predicate applied per candidate document after query
/// selection.
///
/// Every call to [`matches`](ExpressionFilter::matches) counts as one
/// evaluation; evaluation failures count as evaluations but never as
/// matches.
#[derive(Debug)]
pub struct ExpressionFilter {
    expr: Expr,
    evaluation_count: AtomicU64,
    match_count: AtomicU64,
}

impl ExpressionFilter {
    /// Wrap an already-decoded expression tree.
    pub fn new(expr: Expr) -> Self {
        ExpressionFilter {
            expr,
            evaluation_count: AtomicU64::new(0),
            match_count: AtomicU64::new(0),
        }
    }

    /// Decode a filter from its binary wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(ExpressionFilter::new(codec::decode(bytes)?))
    }

    /// Evaluate the predicate against a document.
    ///
    /// The result is the truthiness of the expression value; any
    /// evaluation failure is a non-match.
    pub fn matches(&self, doc: &Document) -> bool {
        self.evaluation_count.fetch_add(1, Ordering::Relaxed);

        let matched = match self.expr.evaluate(doc) {
            Ok(value) => value.truthy(),
            Err(_) => false,
        };

        if matched {
            self.match_count.fetch_add(1, Ordering::Relaxed);
        }
        matched
    }

    /// Evaluate the predicate against a raw JSON document.
    ///
    /// Unparseable JSON is a non-match (and still counts as an
    /// evaluation).
    pub fn matches_json(&self, doc_json: &str) -> bool {
        match serde_json::from_str(doc_json) {
            Ok(source) => self.matches(&Document::new("", source)),
            Err(_) => {
                self.evaluation_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Number of evaluations performed so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count.load(Ordering::Relaxed)
    }

    /// Number of evaluations that matched.
    pub fn match_count(&self) -> u64 {
        self.match_count.load(Ordering::Relaxed)
    }

    /// Both counters as `(evaluations, matches)`.
    pub fn stats(&self) -> (u64, u64) {
        (self.evaluation_count(), self.match_count())
    }

    /// The wrapped expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{BinaryOp, DataType, ExprValue};
    use serde_json::json;

    /// price >= 20 && price <= 40
    fn price_band() -> Expr {
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
        Expr::Binary {
            op: BinaryOp::And,
            result_type: DataType::Bool,
            left: Box::new(cmp(BinaryOp::GreaterEqual, 20)),
            right: Box::new(cmp(BinaryOp::LessEqual, 40)),
        }
    }

    #[test]
    fn test_filter_matches_and_counts() {
        let filter = ExpressionFilter::new(price_band());

        assert!(!filter.matches(&Document::new("a", json!({"price": 10}))));
        assert!(filter.matches(&Document::new("b", json!({"price": 25}))));
        assert!(!filter.matches(&Document::new("c", json!({"price": 5}))));
        assert!(filter.matches(&Document::new("d", json!({"price": 40}))));

        assert_eq!(filter.stats(), (4, 2));
    }

    #[test]
    fn test_filter_evaluation_error_is_non_match() {
        // 1 / price fails on price == 0.
        let expr = Expr::Binary {
            op: BinaryOp::Divide,
            result_type: DataType::Float64,
            left: Box::new(Expr::Const {
                value: ExprValue::Float64(1.0),
                dtype: DataType::Float64,
            }),
            right: Box::new(Expr::Field {
                path: "price".to_string(),
                dtype: DataType::Float64,
            }),
        };
        let filter = ExpressionFilter::new(expr);

        assert!(!filter.matches(&Document::new("a", json!({"price": 0}))));
        assert!(filter.matches(&Document::new("b", json!({"price": 4}))));
        assert_eq!(filter.stats(), (2, 1));
    }

    #[test]
    fn test_filter_from_bytes() {
        let bytes = codec::encode(&price_band());
        let filter = ExpressionFilter::from_bytes(&bytes).unwrap();
        assert!(filter.matches(&Document::new("b", json!({"price": 30}))));

        assert!(ExpressionFilter::from_bytes(&[]).is_err());
        assert!(ExpressionFilter::from_bytes(&[0xff, 0x01]).is_err());
    }

    #[test]
    fn test_filter_matches_json() {
        let filter = ExpressionFilter::new(price_band());
        assert!(filter.matches_json(r#"{"price": 30}"#));
        assert!(!filter.matches_json(r#"{"price": 50}"#));
        assert!(!filter.matches_json("not json"));
        assert_eq!(filter.evaluation_count(), 3);
        assert_eq!(filter.match_count(), 1);
    }
}
