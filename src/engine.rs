//! Embedding facade.
//!
//! The surface embedders program against: every operation that can
//! fail reports through a null-ish return value (`None`, `false`) plus
//! the thread-local last-error accessor pair ([`crate::last_error`] /
//! [`crate::clear_error`]). Nothing panics across this boundary.
//!
//! # Example
//!
//! ```
//! use acacia::Engine;
//!
//! let engine = Engine::open("orders").unwrap();
//! assert!(engine.index_document("o1", r#"{"item":"red fox plush","price":25}"#));
//!
//! let result = engine.search(r#"{"term":{"item":"fox"}}"#, None, 0, 10).unwrap();
//! assert!(result.contains("\"total_hits\":1"));
//! ```

use std::sync::Arc;

use crate::cluster::{DistributedCoordinator, ShardManager};
use crate::error::{set_last_error, AcaciaError};
use crate::expression::ExpressionFilter;
use crate::shard::{SearchOptions, Shard};

/// An open store handle: one shard plus the boundary error contract.
///
/// The path is an opaque identifier; nothing is persisted.
#[derive(Debug)]
pub struct Engine {
    shard: Shard,
}

impl Engine {
    /// Open a store. Fails (returning `None` and setting the last
    /// error) on an empty path.
    pub fn open(path: &str) -> Option<Engine> {
        if path.is_empty() {
            set_last_error(&AcaciaError::invalid_argument("path must not be empty"));
            return None;
        }
        Some(Engine {
            shard: Shard::new(path),
        })
    }

    /// Close the store, dropping all documents.
    pub fn close(self) {}

    /// The underlying shard, for callers that want typed results.
    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    /// Index a document. Returns `false` and sets the last error on
    /// failure; existing state is untouched.
    pub fn index_document(&self, doc_id: &str, doc_json: &str) -> bool {
        match self.shard.index_document(doc_id, doc_json) {
            Ok(()) => true,
            Err(e) => {
                set_last_error(&e);
                false
            }
        }
    }

    /// Delete a document. Returns `false` (with the last error set)
    /// when the id does not exist.
    pub fn delete_document(&self, doc_id: &str) -> bool {
        if self.shard.delete_document(doc_id) {
            true
        } else {
            set_last_error(&AcaciaError::not_found(doc_id));
            false
        }
    }

    /// Make recent writes visible to searches. Writes are synchronous
    /// in this store, so this is a completed no-op.
    pub fn refresh(&self) -> bool {
        true
    }

    /// Persist buffered state. Nothing is persisted in this store, so
    /// this is a completed no-op.
    pub fn flush(&self) -> bool {
        true
    }

    /// Fetch a document's payload as JSON, or `None` when absent.
    pub fn get_document(&self, doc_id: &str) -> Option<String> {
        match self.shard.get_document_json(doc_id) {
            Some(json) => Some(json),
            None => {
                set_last_error(&AcaciaError::not_found(doc_id));
                None
            }
        }
    }

    /// Execute a search, returning the result envelope as JSON.
    pub fn search(
        &self,
        query_json: &str,
        filter: Option<&[u8]>,
        from: usize,
        size: usize,
    ) -> Option<String> {
        let options = SearchOptions {
            from,
            size,
            filter: filter.map(<[u8]>::to_vec),
        };

        match self.shard.search(query_json, &options) {
            Ok(result) => match serde_json::to_string(&result) {
                Ok(json) => Some(json),
                Err(e) => {
                    set_last_error(&AcaciaError::internal(e.to_string()));
                    None
                }
            },
            Err(e) => {
                set_last_error(&e);
                None
            }
        }
    }

    /// Shard statistics as JSON.
    pub fn get_stats(&self) -> Option<String> {
        match serde_json::to_string(&self.shard.stats()) {
            Ok(json) => Some(json),
            Err(e) => {
                set_last_error(&AcaciaError::internal(e.to_string()));
                None
            }
        }
    }
}

/// Create a shard manager. Returns `None` (with the last error set)
/// when `total_shards` is zero.
pub fn create_shard_manager(node_id: &str, total_shards: usize) -> Option<Arc<ShardManager>> {
    match ShardManager::new(node_id, total_shards) {
        Ok(manager) => Some(Arc::new(manager)),
        Err(e) => {
            set_last_error(&e);
            None
        }
    }
}

/// Register an engine's shard with a manager.
pub fn register_shard(
    manager: &ShardManager,
    shard_index: usize,
    engine: &Engine,
    is_primary: bool,
) -> bool {
    match manager.register_shard(shard_index, engine.shard().store(), is_primary) {
        Ok(()) => true,
        Err(e) => {
            set_last_error(&e);
            false
        }
    }
}

/// The shard index a document id routes to.
pub fn shard_for_document(manager: &ShardManager, doc_id: &str) -> usize {
    manager.shard_for_document(doc_id)
}

/// Create a distributed coordinator over a manager's registry.
pub fn create_coordinator(manager: Arc<ShardManager>) -> DistributedCoordinator {
    DistributedCoordinator::new(manager)
}

/// Fan a query out over the coordinator's local shards, returning the
/// merged result envelope as JSON.
pub fn distributed_search(
    coordinator: &DistributedCoordinator,
    query_json: &str,
    filter: Option<&[u8]>,
    from: usize,
    size: usize,
) -> Option<String> {
    let result = coordinator.search(query_json, filter, from, size);
    match serde_json::to_string(&result) {
        Ok(json) => Some(json),
        Err(e) => {
            set_last_error(&AcaciaError::internal(e.to_string()));
            None
        }
    }
}

/// Compile a predicate filter from its binary form. Returns `None`
/// (with the last error set) on malformed bytes.
pub fn create_filter(bytes: &[u8]) -> Option<ExpressionFilter> {
    match ExpressionFilter::from_bytes(bytes) {
        Ok(filter) => Some(filter),
        Err(e) => {
            set_last_error(&e);
            None
        }
    }
}

/// Evaluate a filter against a raw JSON document.
pub fn filter_matches(filter: &ExpressionFilter, doc_json: &str) -> bool {
    filter.matches_json(doc_json)
}

/// A filter's `(evaluations, matches)` counters.
pub fn filter_stats(filter: &ExpressionFilter) -> (u64, u64) {
    filter.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{clear_error, last_error};

    #[test]
    fn test_open_validates_path() {
        clear_error();
        assert!(Engine::open("").is_none());
        assert!(last_error().is_some());

        clear_error();
        assert!(Engine::open("store-1").is_some());
        assert!(last_error().is_none());
    }

    #[test]
    fn test_index_and_get_roundtrip() {
        let engine = Engine::open("t").unwrap();
        assert!(engine.index_document("a", r#"{"title":"red fox"}"#));

        let json = engine.get_document("a").unwrap();
        assert!(json.contains("red fox"));

        clear_error();
        assert!(engine.get_document("zzz").is_none());
        assert_eq!(last_error(), Some("not found: zzz".to_string()));
    }

    #[test]
    fn test_index_failure_sets_last_error() {
        let engine = Engine::open("t").unwrap();
        clear_error();
        assert!(!engine.index_document("a", "{broken"));
        assert!(last_error().unwrap().starts_with("malformed document"));
    }

    #[test]
    fn test_delete_document() {
        let engine = Engine::open("t").unwrap();
        engine.index_document("a", r#"{"x":1}"#);

        assert!(engine.delete_document("a"));
        clear_error();
        assert!(!engine.delete_document("a"));
        assert!(last_error().is_some());
    }

    #[test]
    fn test_refresh_and_flush_are_complete_no_ops() {
        let engine = Engine::open("t").unwrap();
        assert!(engine.refresh());
        assert!(engine.flush());
    }

    #[test]
    fn test_search_returns_envelope_json() {
        let engine = Engine::open("t").unwrap();
        engine.index_document("a", r#"{"title":"red fox"}"#);

        let json = engine
            .search(r#"{"term":{"title":"fox"}}"#, None, 0, 10)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total_hits"], 1);
        assert_eq!(parsed["hits"][0]["_id"], "a");

        clear_error();
        assert!(engine.search("{broken", None, 0, 10).is_none());
        assert!(last_error().is_some());
    }

    #[test]
    fn test_get_stats_json() {
        let engine = Engine::open("t").unwrap();
        engine.index_document("a", r#"{"title":"red fox"}"#);

        let json = engine.get_stats().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["doc_count"], 1);
    }

    #[test]
    fn test_distributed_facade() {
        clear_error();
        assert!(create_shard_manager("n1", 0).is_none());
        assert!(last_error().is_some());

        let manager = create_shard_manager("n1", 2).unwrap();
        let engine0 = Engine::open("s0").unwrap();
        let engine1 = Engine::open("s1").unwrap();
        engine0.index_document("a", r#"{"title":"red fox"}"#);
        engine1.index_document("b", r#"{"title":"quick fox"}"#);

        assert!(register_shard(&manager, 0, &engine0, true));
        assert!(register_shard(&manager, 1, &engine1, true));
        assert!(!register_shard(&manager, 1, &engine1, true));

        let index = shard_for_document(&manager, "a");
        assert!(index < 2);

        let coordinator = create_coordinator(Arc::clone(&manager));
        let json =
            distributed_search(&coordinator, r#"{"term":{"title":"fox"}}"#, None, 0, 10).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["total_hits"], 2);
    }

    #[test]
    fn test_filter_facade() {
        use crate::expression::{codec, BinaryOp, DataType, Expr, ExprValue};

        clear_error();
        assert!(create_filter(&[]).is_none());
        assert!(last_error().is_some());

        let bytes = codec::encode(&Expr::Binary {
            op: BinaryOp::GreaterThan,
            result_type: DataType::Bool,
            left: Box::new(Expr::Field {
                path: "price".to_string(),
                dtype: DataType::Float64,
            }),
            right: Box::new(Expr::Const {
                value: ExprValue::Int64(10),
                dtype: DataType::Int64,
            }),
        });

        let filter = create_filter(&bytes).unwrap();
        assert!(filter_matches(&filter, r#"{"price": 25}"#));
        assert!(!filter_matches(&filter, r#"{"price": 5}"#));
        assert_eq!(filter_stats(&filter), (2, 1));
    }
}
