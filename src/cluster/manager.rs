//! Shard placement, local-shard registry, and cluster topology.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::{AcaciaError, Result};
use crate::store::DocumentStore;

/// Nodes are considered alive while their last heartbeat is within
/// this window.
const HEARTBEAT_TIMEOUT_MS: i64 = 30_000;

/// Metadata for one registered shard.
#[derive(Debug, Clone)]
pub struct ShardInfo {
    pub shard_id: String,
    pub node_id: String,
    pub shard_index: usize,
    pub total_shards: usize,
    pub is_primary: bool,
    pub replica_nodes: Vec<String>,
}

/// Advisory information about a cluster node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub node_id: String,
    pub address: String,
    pub is_active: bool,
    /// Milliseconds since epoch of the last heartbeat.
    pub last_heartbeat: i64,
}

#[derive(Debug, Default)]
struct ShardRegistry {
    stores: AHashMap<usize, Arc<DocumentStore>>,
    info: AHashMap<usize, ShardInfo>,
}

/// Routes documents to shards via consistent hashing and tracks the
/// local shard registry plus cluster topology.
#[derive(Debug)]
pub struct ShardManager {
    node_id: String,
    total_shards: usize,
    shards: Mutex<ShardRegistry>,
    nodes: Mutex<AHashMap<String, NodeInfo>>,
}

impl ShardManager {
    /// Create a manager for `total_shards` partitions.
    pub fn new(node_id: impl Into<String>, total_shards: usize) -> Result<Self> {
        if total_shards == 0 {
            return Err(AcaciaError::invalid_argument(
                "total_shards must be positive",
            ));
        }
        Ok(ShardManager {
            node_id: node_id.into(),
            total_shards,
            shards: Mutex::new(ShardRegistry::default()),
            nodes: Mutex::new(AHashMap::new()),
        })
    }

    /// This manager's node id.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Number of shards in the cluster.
    pub fn total_shards(&self) -> usize {
        self.total_shards
    }

    /// The shard index owning a document id. Deterministic and stable
    /// across processes and platforms for a given `total_shards`.
    pub fn shard_for_document(&self, doc_id: &str) -> usize {
        murmur_hash32(doc_id.as_bytes()) as usize % self.total_shards
    }

    /// Shard indices a query may need to touch. Currently every shard:
    /// callers may rely on the returned list being a superset of the
    /// shards that can match.
    pub fn shards_for_query(&self, _query_json: &str) -> Vec<usize> {
        (0..self.total_shards).collect()
    }

    /// Register a local shard's store.
    ///
    /// The index must lie in `[0, total_shards)`, and a shard may be
    /// registered at most once per role: a second primary for the same
    /// index is refused, while replica registrations append this node to
    /// the entry's replica list.
    pub fn register_shard(
        &self,
        shard_index: usize,
        store: Arc<DocumentStore>,
        is_primary: bool,
    ) -> Result<()> {
        if shard_index >= self.total_shards {
            return Err(AcaciaError::invalid_argument(format!(
                "shard index {shard_index} out of range [0, {})",
                self.total_shards
            )));
        }

        let mut registry = self.shards.lock();

        if let Some(info) = registry.info.get_mut(&shard_index) {
            if is_primary {
                if info.is_primary {
                    return Err(AcaciaError::invalid_argument(format!(
                        "shard {shard_index} already has a primary"
                    )));
                }
                info.is_primary = true;
                registry.stores.insert(shard_index, store);
            } else {
                if info.replica_nodes.contains(&self.node_id) {
                    return Err(AcaciaError::invalid_argument(format!(
                        "shard {shard_index} already has a replica on {}",
                        self.node_id
                    )));
                }
                info.replica_nodes.push(self.node_id.clone());
            }
            return Ok(());
        }

        registry.stores.insert(shard_index, store);
        registry.info.insert(
            shard_index,
            ShardInfo {
                shard_id: format!("{}_shard_{shard_index}", self.node_id),
                node_id: self.node_id.clone(),
                shard_index,
                total_shards: self.total_shards,
                is_primary,
                replica_nodes: if is_primary {
                    Vec::new()
                } else {
                    vec![self.node_id.clone()]
                },
            },
        );

        Ok(())
    }

    /// The store registered for a shard index, if local.
    pub fn shard_store(&self, shard_index: usize) -> Option<Arc<DocumentStore>> {
        self.shards.lock().stores.get(&shard_index).cloned()
    }

    /// Locally registered shard indices, ascending.
    pub fn local_shards(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.shards.lock().stores.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Metadata for a registered shard.
    pub fn shard_info(&self, shard_index: usize) -> Option<ShardInfo> {
        self.shards.lock().info.get(&shard_index).cloned()
    }

    /// Add or replace a node in the topology map.
    pub fn add_node(&self, node: NodeInfo) {
        self.nodes.lock().insert(node.node_id.clone(), node);
    }

    /// Remove a node from the topology map.
    pub fn remove_node(&self, node_id: &str) {
        self.nodes.lock().remove(node_id);
    }

    /// Look up a node.
    pub fn node(&self, node_id: &str) -> Option<NodeInfo> {
        self.nodes.lock().get(node_id).cloned()
    }

    /// Refresh a node's heartbeat timestamp. Returns whether the node
    /// is known.
    pub fn record_heartbeat(&self, node_id: &str) -> bool {
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(node_id) {
            Some(node) => {
                node.last_heartbeat = chrono::Utc::now().timestamp_millis();
                true
            }
            None => false,
        }
    }

    /// Ids of nodes flagged active whose heartbeat is within the
    /// 30-second window.
    pub fn active_nodes(&self) -> Vec<String> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut active: Vec<String> = self
            .nodes
            .lock()
            .values()
            .filter(|node| node.is_active && now - node.last_heartbeat < HEARTBEAT_TIMEOUT_MS)
            .map(|node| node.node_id.clone())
            .collect();
        active.sort();
        active
    }
}

/// 32-bit Murmur-style hash with a fixed seed.
///
/// Byte chunks are read little-endian explicitly so placement is
/// identical on every platform.
fn murmur_hash32(key: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let mut h = SEED ^ key.len() as u32;

    let mut chunks = key.chunks_exact(4);
    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes(chunk.try_into().unwrap());
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        if tail.len() >= 3 {
            h ^= u32::from(tail[2]) << 16;
        }
        if tail.len() >= 2 {
            h ^= u32::from(tail[1]) << 8;
        }
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}
