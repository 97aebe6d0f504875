//! proptest strategies for exercising the engine.
//!
//! # Example
//!
//! ```ignore
//! use proptest::prelude::*;
//! use strata_testkit::generators::*;
//!
//! proptest! {
//!     #[test]
//!     fn ingest_matches_model(edges in edge_batch(64, 500)) {
//!         // feed the engine and the reference model, compare
//!     }
//! }
//! ```

use proptest::prelude::*;
use strata_core::GraphConfig;

/// A vertex id in `[0, max_vertex)`.
pub fn vertex(max_vertex: u64) -> impl Strategy<Value = u64> {
    0..max_vertex
}

/// A directed edge within `[0, max_vertex)`, self-loops allowed.
pub fn edge(max_vertex: u64) -> impl Strategy<Value = (u64, u64)> {
    (0..max_vertex, 0..max_vertex)
}

/// A batch of edges; skew towards small sources so some vertices grow
/// dense adjacency while others stay empty.
pub fn edge_batch(max_vertex: u64, max_len: usize) -> impl Strategy<Value = Vec<(u64, u64)>> {
    let skewed = prop_oneof![
        3 => (0..max_vertex.min(4), 0..max_vertex),
        2 => (0..max_vertex, 0..max_vertex),
    ];
    prop::collection::vec(skewed, 0..=max_len)
}

/// Small valid engine configurations covering the interesting axes:
/// mini-batch size, partition width, merge threshold, index granularity.
pub fn engine_config(vertex_count: usize) -> impl Strategy<Value = GraphConfig> {
    let vertex_count = vertex_count.max(1);
    // Cap the partition count (each one costs a sorter thread).
    (
        prop_oneof![Just(2usize), Just(4), Just(8), Just(16)],
        vertex_count.div_ceil(8)..=vertex_count,
        prop_oneof![Just(1.5f64), Just(2.0), Just(4.0)],
    )
        .prop_map(move |(sort_batch_size, partition_size, merge_multiplier)| GraphConfig {
            auto_extend: false,
            bind_core: false,
            bind_numa: false,
            buffer_count: 1,
            // Plenty of room for every pushed edge plus writer blocks.
            buffer_size: 1 << 14,
            dispatch_thread_count: 2,
            index_ratio: sort_batch_size.min(8),
            init_vertex_count: vertex_count,
            merge_multiplier,
            partition_size,
            sort_batch_size,
        })
}
