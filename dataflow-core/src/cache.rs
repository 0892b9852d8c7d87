//! Content-addressed graph identity, for tooling that wants to skip
//! re-running the pass pipeline over an unchanged graph (`xtask`'s
//! `validate-nodes`, or a future incremental `dataflow-cli` cache).
//!
//! Hashes node identity and arc topology in a deterministic (sorted) order,
//! the same way `esper_compiler::cache::CacheKey::hash_graph` sorts entity
//! ids and edges before hashing: two calls against the same `Graph` value
//! always agree, and tombstoned (removed) slots in the underlying
//! `StableDiGraph` are never visited, since `node_indices()`/`edge_indices()`
//! skip them. Node/arc endpoints are keyed on each live node's *rank* —
//! its position in ascending `NodeIndex` order among currently-live nodes —
//! rather than its raw slot number, so a graph that once held and then
//! removed an earlier node hashes identically to one that never held it:
//! the raw `StableDiGraph` slot number is allocation-history-dependent
//! (tombstoned slots are skipped, not renumbered), but rank is not. This is
//! still a cache key for "this exact graph value", not a structural-
//! equality test across two independently-built graphs whose surviving
//! nodes happened to be added in a different relative order.

use crate::graph::Graph;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// SHA-256 digest, hex-encoded, over the graph's node kinds (by node-local
/// external-attribute representation) and arc endpoints/weights, both
/// sorted for determinism independent of `node_indices()`'s iteration order.
pub fn content_hash(graph: &Graph) -> String {
    let mut hasher = Sha256::new();

    let mut live: Vec<_> = graph.inner.node_indices().collect();
    live.sort_by_key(|idx| idx.index());
    let rank: HashMap<_, usize> = live.iter().enumerate().map(|(r, &idx)| (idx, r)).collect();

    let mut node_digests: Vec<String> = live
        .iter()
        .map(|&idx| {
            let node = graph.node(idx).expect("node_indices yields live nodes");
            let (tag, attrs) = node.kind.to_attrs();
            format!("{}:{}:{:?}", rank[&idx], tag, attrs)
        })
        .collect();
    node_digests.sort();
    for digest in &node_digests {
        hasher.update(digest.as_bytes());
    }

    let mut arc_digests: Vec<String> = graph
        .inner
        .edge_indices()
        .map(|idx| {
            let (src, dst) = graph
                .inner
                .edge_endpoints(idx)
                .expect("edge_indices yields live edges");
            let arc = graph.arc(idx).expect("edge_indices yields live edges");
            format!(
                "{}->{}:{}:{}:{}",
                rank[&src], rank[&dst], arc.src_port, arc.dst_port, arc.order_constraint
            )
        })
        .collect();
    arc_digests.sort();
    for digest in &arc_digests {
        hasher.update(digest.as_bytes());
    }

    hex::encode(hasher.finalize())
}
