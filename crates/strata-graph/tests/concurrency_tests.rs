//! Concurrency-facing behavior.
//!
//! Parallel dispatchers feeding one graph, parallel readers sharing one
//! frozen view, and repeated ingest/freeze/unfreeze cycles with the
//! reference model checking every round.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_graph::{Edge, EdgeOrder, Graph, GraphConfig, TGraph};

fn config(vertex_count: usize, partitions: usize) -> GraphConfig {
    GraphConfig {
        auto_extend: false,
        bind_core: false,
        bind_numa: false,
        buffer_count: 1,
        buffer_size: 1 << 14,
        dispatch_thread_count: 4,
        index_ratio: 8,
        init_vertex_count: vertex_count,
        merge_multiplier: 2.0,
        partition_size: vertex_count.div_ceil(partitions),
        sort_batch_size: 8,
    }
}

/// Deterministic pseudo-random edge stream.
fn edge_stream(n: usize, vertices: u64, seed: u64) -> Vec<Edge<u64>> {
    let mut x = seed;
    (0..n)
        .map(|_| {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            Edge::unweighted((x >> 33) % vertices, x % vertices)
        })
        .collect()
}

#[test]
fn test_parallel_readers_share_one_view() {
    let edges = edge_stream(4096, 64, 7);
    let mut degrees: HashMap<u64, usize> = HashMap::new();
    for e in &edges {
        *degrees.entry(e.from).or_default() += 1;
    }

    let mut graph: Graph<u64> = Graph::new(config(64, 4)).unwrap();
    graph.add_edge_batch(&edges);
    graph.collect();
    let frozen = graph.freeze_for_read();

    // Eight readers sweep disjoint vertex stripes concurrently.
    let checked = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for reader in 0..8u64 {
            let frozen = &frozen;
            let degrees = &degrees;
            let checked = &checked;
            scope.spawn(move || {
                let mut v = reader;
                while v < 64 {
                    assert_eq!(
                        frozen.get_degree(v),
                        degrees.get(&v).copied().unwrap_or(0),
                        "degree of {}",
                        v
                    );
                    let mut count = 0;
                    frozen.iterate_neighbors(v, |_| count += 1);
                    assert_eq!(count, frozen.get_degree(v));
                    checked.fetch_add(1, Ordering::Relaxed);
                    v += 8;
                }
            });
        }
    });
    assert_eq!(checked.into_inner(), 64);
}

#[test]
fn test_repeated_ingest_freeze_cycles() {
    let mut graph: Graph<u64> = Graph::new(config(32, 2)).unwrap();
    let mut degrees: HashMap<u64, usize> = HashMap::new();

    for round in 0..5u64 {
        let edges = edge_stream(512, 32, round + 1);
        for e in &edges {
            *degrees.entry(e.from).or_default() += 1;
        }
        graph.add_edge_batch(&edges);
        graph.collect();

        let frozen = graph.freeze_for_read();
        assert_eq!(frozen.edge_count(), 512 * (round as usize + 1));
        for v in 0..32u64 {
            assert_eq!(
                frozen.get_degree(v),
                degrees.get(&v).copied().unwrap_or(0),
                "round {} vertex {}",
                round,
                v
            );
        }
        frozen.unfreeze_for_write();
    }
}

#[test]
fn test_tgraph_batch_dispatch_and_in_order() {
    // (from, to)-ordered two-way graph, triangle-counting style.
    let mut graph: TGraph<u64> =
        TGraph::with_order(config(32, 2), EdgeOrder::BySourceTarget).unwrap();

    let edges = edge_stream(2048, 32, 42);
    let mut out_model: HashMap<u64, Vec<u64>> = HashMap::new();
    let mut in_model: HashMap<u64, Vec<u64>> = HashMap::new();
    for e in &edges {
        out_model.entry(e.from).or_default().push(e.to);
        in_model.entry(e.to).or_default().push(e.from);
    }

    graph.add_edge_batch(&edges);
    graph.collect();
    let frozen = graph.freeze_for_read();

    for v in 0..32u64 {
        let mut expected_out = out_model.remove(&v).unwrap_or_default();
        expected_out.sort_unstable();
        let mut got_out = Vec::new();
        frozen.out_view().iterate_neighbors_in_order(v, |to| got_out.push(to));
        assert_eq!(got_out, expected_out, "ordered out-neighbors of {}", v);

        let mut expected_in = in_model.remove(&v).unwrap_or_default();
        expected_in.sort_unstable();
        let mut got_in = Vec::new();
        frozen.iterate_neighbors_in(v, |to| got_in.push(to));
        got_in.sort_unstable();
        assert_eq!(got_in, expected_in, "in-neighbors of {}", v);
    }
}

#[test]
fn test_sleep_metric_accumulates_while_idle() {
    let mut graph: Graph<u64> = Graph::new(config(32, 2)).unwrap();
    graph.add_edge(Edge::unweighted(1, 2), 0);
    graph.collect();
    // Give idle sorters a few wakeups.
    std::thread::sleep(std::time::Duration::from_millis(60));
    let frozen = graph.freeze_for_read();
    assert_eq!(frozen.get_degree(1), 1);
    frozen.unfreeze_for_write();
    assert!(graph.total_sleep_millis() > 0);
}
