//! # Acacia
//!
//! An embeddable, sharded, in-memory JSON document search engine.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Positional inverted index with BM25 ranking
//! - JSON query DSL: term, match, phrase, range, prefix, wildcard,
//!   fuzzy, and recursive boolean composition
//! - Compiled binary predicate filters evaluated per document
//! - Aggregations: terms, stats, extended stats, histograms,
//!   percentiles, cardinality, and single-metric variants
//! - Consistent-hash document placement with parallel fan-out search
//!   and score-based merging

// Core modules
pub mod analysis;
pub mod cluster;
pub mod document;
mod engine;
mod error;
pub mod expression;
mod query;
pub mod shard;
pub mod store;

// Re-exports for the public API
pub use cluster::{DistributedCoordinator, NodeInfo, ShardInfo, ShardManager};
pub use document::{Document, FieldType};
pub use engine::{
    create_coordinator, create_filter, create_shard_manager, distributed_search, filter_matches,
    filter_stats, register_shard, shard_for_document, Engine,
};
pub use error::{clear_error, last_error, AcaciaError, Result};
pub use expression::{Expr, ExprValue, ExpressionFilter};
pub use shard::{SearchHit, SearchOptions, SearchResult, Shard, ShardStats};
pub use store::{DocumentStore, RangeQuery, StoreStats};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
