//! Engine correctness scenarios.
//!
//! End-to-end checks of the ingest → collect → freeze → query lifecycle:
//! minimal routing, multi-neighbor accumulation, tiered merging, density
//! -aware sampling, the two-way and undirected composites, and the
//! freeze/collect laws.

use std::collections::HashMap;
use strata_graph::{Edge, Graph, GraphConfig, Step, TGraph, UGraph};

type E = Edge<u64>;

fn config(
    vertex_count: usize,
    partition_size: usize,
    sort_batch: usize,
    buffer: usize,
) -> GraphConfig {
    GraphConfig {
        auto_extend: false,
        bind_core: false,
        bind_numa: false,
        buffer_count: 1,
        buffer_size: buffer,
        dispatch_thread_count: 2,
        index_ratio: sort_batch.min(8),
        init_vertex_count: vertex_count,
        merge_multiplier: 2.0,
        partition_size,
        sort_batch_size: sort_batch,
    }
}

fn sorted_neighbors(frozen: &strata_graph::FrozenGraph<'_, u64>, v: u64) -> Vec<u64> {
    let mut out = Vec::new();
    frozen.iterate_neighbors(v, |to| out.push(to));
    out.sort_unstable();
    out
}

// ============================================================================
// S1: minimal correctness across two partitions
// ============================================================================

#[test]
fn test_minimal_ring_routing() {
    let mut graph: Graph<u64> = Graph::new(config(8, 4, 2, 16)).unwrap();
    let edges = [(0, 1), (1, 2), (2, 3), (3, 0), (4, 5), (5, 6), (6, 7), (7, 4)];
    for (f, t) in edges {
        graph.add_edge(E::unweighted(f, t), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    for (f, t) in edges {
        assert_eq!(sorted_neighbors(&frozen, f), vec![t], "neighbors of {}", f);
        assert_eq!(frozen.get_degree(f), 1);
    }
    assert_eq!(frozen.vertex_count(), 8);
    assert_eq!(frozen.edge_count(), 8);
}

// ============================================================================
// S2: multi-neighbor accumulation with duplicates
// ============================================================================

#[test]
fn test_multi_neighbor_multiset() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 16)).unwrap();
    for (f, t) in [(0, 1), (0, 2), (0, 3), (0, 1)] {
        graph.add_edge(E::unweighted(f, t), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    assert_eq!(sorted_neighbors(&frozen, 0), vec![1, 1, 2, 3]);
    assert_eq!(frozen.get_degree(0), 4);
    assert_eq!(frozen.get_degree(1), 0);
}

// ============================================================================
// S3: tiered merge keeps the run count bounded
// ============================================================================

#[test]
fn test_tiered_merge_bounds_runs() {
    let mut graph: Graph<u64> = Graph::new(config(16, 16, 4, 64)).unwrap();
    for i in 0..48u64 {
        graph.add_edge(E::unweighted(0, i), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let stats = frozen.partition_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].sorted_len + stats[0].tail_len, 48);
    assert!(
        stats[0].run_count <= 3,
        "tiered compaction left {} runs",
        stats[0].run_count
    );
    assert_eq!(sorted_neighbors(&frozen, 0), (0..48).collect::<Vec<_>>());
    assert_eq!(frozen.get_degree(0), 48);
}

// ============================================================================
// S4: density-aware sampling caps per-source delivery
// ============================================================================

#[test]
fn test_sample_density_aware_caps() {
    let mut graph: Graph<u64> = Graph::new(config(8, 8, 2, 64)).unwrap();
    for t in [0u64, 1, 2, 4, 5] {
        graph.add_edge(E::unweighted(3, t), 0);
    }
    graph.add_edge(E::unweighted(1, 6), 0);
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut per_source: HashMap<u64, usize> = HashMap::new();
    frozen.sample_neighbors_range_density_aware(0, 8, 2, |from, _to, _i| {
        *per_source.entry(from).or_default() += 1;
    });
    assert_eq!(per_source[&3], 2, "vertex 3 delivers exactly k samples");
    assert_eq!(per_source[&1], 1);
    assert_eq!(per_source.len(), 2);
}

// ============================================================================
// S5: two-way composite symmetry
// ============================================================================

#[test]
fn test_tgraph_directions() {
    let mut graph: TGraph<u64> = TGraph::new(config(6, 3, 2, 32)).unwrap();
    for (f, t) in [(1, 2), (2, 3), (1, 3)] {
        graph.add_edge(E::unweighted(f, t));
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut out1 = Vec::new();
    frozen.iterate_neighbors_out(1, |to| out1.push(to));
    out1.sort_unstable();
    assert_eq!(out1, vec![2, 3]);

    let mut in3 = Vec::new();
    frozen.iterate_neighbors_in(3, |to| in3.push(to));
    in3.sort_unstable();
    assert_eq!(in3, vec![1, 2]);

    assert_eq!(frozen.get_degree_out(1), 2);
    assert_eq!(frozen.get_degree_in(3), 2);
    assert_eq!(frozen.get_degree_in(1), 0);
    frozen.unfreeze_for_write();

    assert_eq!(graph.vertex_count(), 6);
    assert_eq!(graph.edge_count(), 3);
}

// ============================================================================
// S6: undirected in-order traversal
// ============================================================================

#[test]
fn test_ugraph_in_order() {
    let mut graph: UGraph<u64> = UGraph::new(config(5, 5, 2, 32)).unwrap();
    for (f, t) in [(0, 2), (2, 0), (0, 1)] {
        graph.add_edge(E::unweighted(f, t));
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut ordered = Vec::new();
    frozen.iterate_neighbors_in_order(0, |to| ordered.push(to));
    assert_eq!(ordered, vec![1, 2, 2], "ascending, one per direction");

    assert_eq!(frozen.get_degree(0), 3);
    frozen.unfreeze_for_write();
    assert_eq!(graph.edge_count(), 3);
}

// ============================================================================
// Laws: freeze/unfreeze and collect idempotence
// ============================================================================

#[test]
fn test_freeze_unfreeze_is_noop_on_edges() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 16)).unwrap();
    for (f, t) in [(0, 1), (0, 2), (1, 3)] {
        graph.add_edge(E::unweighted(f, t), 0);
    }
    graph.collect();

    let first: Vec<Vec<u64>> = {
        let frozen = graph.freeze_for_read();
        (0..4).map(|v| sorted_neighbors(&frozen, v)).collect()
    };
    let second: Vec<Vec<u64>> = {
        let frozen = graph.freeze_for_read();
        (0..4).map(|v| sorted_neighbors(&frozen, v)).collect()
    };
    assert_eq!(first, second);
}

#[test]
fn test_double_collect_is_idempotent() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 32)).unwrap();
    for i in 0..5u64 {
        graph.add_edge(E::unweighted(1, i), 0);
    }
    graph.collect();
    let count = graph.edge_count();
    graph.collect();
    assert_eq!(graph.edge_count(), count);

    let frozen = graph.freeze_for_read();
    assert_eq!(sorted_neighbors(&frozen, 1), (0..5).collect::<Vec<_>>());
}

#[test]
fn test_ingest_between_freezes() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 32)).unwrap();
    graph.add_edge(E::unweighted(0, 1), 0);
    graph.add_edge(E::unweighted(0, 2), 0);
    graph.collect();
    {
        let frozen = graph.freeze_for_read();
        assert_eq!(frozen.get_degree(0), 2);
    }
    graph.add_edge(E::unweighted(0, 3), 0);
    graph.collect();
    let frozen = graph.freeze_for_read();
    assert_eq!(sorted_neighbors(&frozen, 0), vec![1, 2, 3]);
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_empty_graph_freeze() {
    let mut graph: Graph<u64> = Graph::new(config(8, 4, 2, 16)).unwrap();
    graph.collect();
    let frozen = graph.freeze_for_read();
    assert_eq!(frozen.edge_count(), 0);
    assert_eq!(frozen.get_degree(0), 0);
    assert_eq!(frozen.get_degree(7), 0);
}

#[test]
fn test_single_edge_and_extremes() {
    let mut graph: Graph<u64> = Graph::new(config(8, 4, 2, 16)).unwrap();
    graph.add_edge(E::unweighted(7, 0), 0);
    graph.collect();
    let frozen = graph.freeze_for_read();
    assert_eq!(sorted_neighbors(&frozen, 7), vec![0], "last vertex");
    assert_eq!(sorted_neighbors(&frozen, 0), Vec::<u64>::new(), "first vertex");
    assert_eq!(frozen.get_degree(7), 1);
    // The other partition never saw an edge.
    assert_eq!(frozen.get_degree(2), 0);
}

#[test]
fn test_batch_not_multiple_of_sort_batch() {
    // 7 edges with B = 4: one mini-batch sorts, 3 edges stay in the tail.
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 4, 32)).unwrap();
    for i in 0..7u64 {
        graph.add_edge(E::unweighted(2, i), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();
    assert_eq!(sorted_neighbors(&frozen, 2), (0..7).collect::<Vec<_>>());
    assert_eq!(frozen.get_degree(2), 7);

    let stats = frozen.partition_stats();
    assert_eq!(stats[0].sorted_len + stats[0].tail_len, 7);
}

#[test]
fn test_range_iteration_spans_partitions() {
    let mut graph: Graph<u64> = Graph::new(config(8, 4, 2, 32)).unwrap();
    let edges = [(0, 5), (3, 6), (4, 7), (7, 1)];
    for (f, t) in edges {
        graph.add_edge(E::unweighted(f, t), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut seen = Vec::new();
    frozen.iterate_neighbors_range(0, 8, |from, to| seen.push((from, to)));
    seen.sort_unstable();
    let mut expected = edges.to_vec();
    expected.sort_unstable();
    assert_eq!(seen, expected);

    // Sub-range touches only the second partition.
    let mut seen = Vec::new();
    frozen.iterate_neighbors_range(4, 8, |from, to| seen.push((from, to)));
    seen.sort_unstable();
    assert_eq!(seen, vec![(4, 7), (7, 1)]);
}

#[test]
fn test_range_in_level_step_contract() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 32)).unwrap();
    for (f, t) in [(0, 1), (0, 2), (1, 3), (1, 4), (2, 5), (2, 6)] {
        graph.add_edge(E::unweighted(f, t), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut firsts = Vec::new();
    frozen.iterate_neighbors_range_in_level(0, 4, 0, |from, _to| {
        firsts.push(from);
        Step::SkipToNextVertex
    });
    let mut dedup = firsts.clone();
    dedup.dedup();
    assert_eq!(firsts, dedup, "skip lands on a fresh source each time");

    let mut visits = 0;
    frozen.iterate_neighbors_range_in_level(0, 4, 0, |_, _| {
        visits += 1;
        Step::Break
    });
    assert_eq!(visits, 1);
}

// ============================================================================
// Auto-extend and range errors
// ============================================================================

#[test]
fn test_auto_extend_grows_partitions() {
    let mut cfg = config(0, 4, 2, 32);
    cfg.auto_extend = true;
    let mut graph: Graph<u64> = Graph::new(cfg).unwrap();
    assert_eq!(graph.partition_count(), 0);

    graph.add_edge(E::unweighted(10, 2), 0);
    assert_eq!(graph.partition_count(), 3, "partitions cover vertex 10");
    assert_eq!(graph.vertex_count(), 11);

    graph.collect();
    let frozen = graph.freeze_for_read();
    assert_eq!(sorted_neighbors(&frozen, 10), vec![2]);
}

#[test]
#[should_panic(expected = "auto_extend is off")]
fn test_out_of_range_without_auto_extend_is_fatal() {
    let graph: Graph<u64> = Graph::new(config(4, 4, 2, 16)).unwrap();
    graph.add_edge(E::unweighted(9, 1), 0);
}

// ============================================================================
// Weights, batches, bitmaps
// ============================================================================

#[test]
fn test_weighted_edges_round_trip() {
    let mut graph: Graph<u32, f32> = Graph::new(config(4, 4, 2, 16)).unwrap();
    graph.add_edge(Edge::new(1u32, 2u32, 0.5f32), 0);
    graph.add_edge(Edge::new(1u32, 3u32, 1.5f32), 0);
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut edges = frozen.neighbors_vec(1);
    edges.sort_unstable_by_key(|e| e.to);
    assert_eq!(edges.len(), 2);
    assert_eq!((edges[0].to, edges[0].weight), (2, 0.5));
    assert_eq!((edges[1].to, edges[1].weight), (3, 1.5));
}

#[test]
fn test_batch_dispatch_matches_single_pushes() {
    let edges: Vec<E> = (0..256u64).map(|i| E::unweighted(i % 16, i / 16)).collect();

    let mut batched: Graph<u64> = Graph::new(config(16, 8, 4, 1 << 10)).unwrap();
    batched.add_edge_batch(&edges);
    batched.collect();

    let mut single: Graph<u64> = Graph::new(config(16, 8, 4, 1 << 10)).unwrap();
    for e in &edges {
        single.add_edge(*e, 0);
    }
    single.collect();

    let frozen_b = batched.freeze_for_read();
    let frozen_s = single.freeze_for_read();
    for v in 0..16u64 {
        assert_eq!(sorted_neighbors(&frozen_b, v), sorted_neighbors(&frozen_s, v));
    }
}

#[test]
fn test_nonempty_bitmaps_stay_conservative() {
    let mut graph: Graph<u64> = Graph::new(config(8, 4, 2, 32)).unwrap();
    graph.add_edge(E::unweighted(1, 5), 0);
    graph.add_edge(E::unweighted(6, 0), 0);
    graph.collect();

    let mut frozen = graph.freeze_for_read();
    frozen.build_nonempty_bitmaps();
    assert_eq!(frozen.get_degree(1), 1);
    assert_eq!(frozen.get_degree(6), 1);
    assert_eq!(frozen.get_degree(0), 0);
    assert_eq!(frozen.get_degree(5), 0);
    frozen.unfreeze_for_write();

    // Filters are invalidated on unfreeze; answers unchanged.
    let frozen = graph.freeze_for_read();
    assert_eq!(frozen.get_degree(1), 1);
    assert_eq!(frozen.get_degree(0), 0);
}

#[test]
fn test_iterate_neighbors_while_breaks_early() {
    let mut graph: Graph<u64> = Graph::new(config(4, 4, 2, 32)).unwrap();
    for t in 0..6u64 {
        graph.add_edge(E::unweighted(1, t), 0);
    }
    graph.collect();
    let frozen = graph.freeze_for_read();

    let mut seen = 0;
    let finished = frozen.iterate_neighbors_while(1, |_| {
        seen += 1;
        seen < 3
    });
    assert!(!finished);
    assert_eq!(seen, 3);
}

// ============================================================================
// Skewed ingestion under concurrent sorting (exercises stealing)
// ============================================================================

#[test]
fn test_skewed_ingestion_stays_correct() {
    let width = 1 << 16;
    let mut cfg = config(2 * width, width, 1024, 1 << 18);
    cfg.index_ratio = 8;
    let mut graph: Graph<u32> = Graph::new(cfg).unwrap();

    // Heavy skew: almost everything lands in partition 0, over a small
    // set of sources so degrees are checkable.
    let mut expected: HashMap<u32, usize> = HashMap::new();
    let mut edges: Vec<Edge<u32>> = Vec::new();
    let mut x = 12345u64;
    for i in 0..120_000u64 {
        x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let from = (x % 1000) as u32;
        let to = (i % 50_000) as u32;
        edges.push(Edge::unweighted(from, to));
        *expected.entry(from).or_default() += 1;
    }
    for i in 0..2_000u32 {
        let from = width as u32 + (i % 100);
        edges.push(Edge::unweighted(from, i));
        *expected.entry(from).or_default() += 1;
    }

    graph.add_edge_batch(&edges);
    graph.collect();
    let frozen = graph.freeze_for_read();

    assert_eq!(frozen.edge_count(), edges.len());
    let spot_checks = (0u32..1000)
        .step_by(97)
        .chain((width as u32..width as u32 + 100).step_by(13));
    for v in spot_checks {
        assert_eq!(
            frozen.get_degree(v),
            expected.get(&v).copied().unwrap_or(0),
            "degree of {}",
            v
        );
    }
}
