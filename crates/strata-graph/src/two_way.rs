//! Directed two-way composite: an out-edge graph and an in-edge graph.
//!
//! Every appended edge `(u, v)` is routed as-is into `g_out` and
//! reversed into `g_in`, so both adjacency directions are available
//! after a freeze. The two graphs carry opposite NUMA roles, spreading
//! their partitions across sockets.

use crate::dispatch::dispatch_batch;
use crate::graph::Graph;
use crate::view::FrozenGraph;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_core::{Edge, EdgeOrder, EdgeWeight, GraphConfig, Result, VertexId};

pub struct TGraph<V: VertexId, W: EdgeWeight = ()> {
    g_in: Graph<V, W>,
    g_out: Graph<V, W>,
    edge_count: AtomicUsize,
    dispatch_threads: usize,
}

impl<V: VertexId, W: EdgeWeight> TGraph<V, W> {
    pub fn new(config: GraphConfig) -> Result<Self> {
        Self::with_order(config, EdgeOrder::BySource)
    }

    /// Opens the pair with an explicit ordering policy
    /// (`BySourceTarget` when in-order traversal is needed).
    pub fn with_order(config: GraphConfig, order: EdgeOrder) -> Result<Self> {
        let dispatch_threads = config.dispatch_thread_count;
        Ok(Self {
            g_in: Graph::with_options(config.clone(), order, 0)?,
            g_out: Graph::with_options(config, order, 1)?,
            edge_count: AtomicUsize::new(0),
            dispatch_threads,
        })
    }

    /// Appends one edge through writer slot 0 of both graphs.
    pub fn add_edge(&self, e: Edge<V, W>) {
        self.g_in.add_edge(e.reverse(), 0);
        self.g_out.add_edge(e, 0);
        self.edge_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fans a batch out over the configured dispatcher threads; each
    /// worker feeds both graphs under its own writer id.
    pub fn add_edge_batch(&self, edges: &[Edge<V, W>]) {
        self.edge_count.fetch_add(edges.len(), Ordering::Relaxed);
        dispatch_batch(self.dispatch_threads, edges, |e, tid| {
            self.g_in.add_edge(e.reverse(), tid);
            self.g_out.add_edge(e, tid);
        });
    }

    pub fn collect(&mut self) {
        self.g_in.collect();
        self.g_out.collect();
    }

    /// Freezes both directions: flags first (so the sorters drain in
    /// parallel), then waits on each.
    pub fn freeze_for_read(&mut self) -> FrozenTGraph<'_, V, W> {
        self.g_in.freeze_for_read_async();
        self.g_out.freeze_for_read_async();
        FrozenTGraph {
            in_view: self.g_in.wait_frozen(),
            out_view: self.g_out.wait_frozen(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.g_in.vertex_count()
    }

    /// Input edges appended (each counted once, not per direction).
    pub fn edge_count(&self) -> usize {
        self.edge_count.load(Ordering::Relaxed)
    }

    pub fn total_sleep_millis(&self) -> u64 {
        self.g_in.total_sleep_millis() + self.g_out.total_sleep_millis()
    }
}

/// Read guard over both directions of a [`TGraph`].
pub struct FrozenTGraph<'g, V: VertexId, W: EdgeWeight = ()> {
    in_view: FrozenGraph<'g, V, W>,
    out_view: FrozenGraph<'g, V, W>,
}

impl<V: VertexId, W: EdgeWeight> FrozenTGraph<'_, V, W> {
    pub fn unfreeze_for_write(self) {}

    /// The in-edge direction as a plain frozen graph (sources there are
    /// this graph's targets).
    pub fn in_view(&self) -> &FrozenGraph<'_, V, W> {
        &self.in_view
    }

    pub fn out_view(&self) -> &FrozenGraph<'_, V, W> {
        &self.out_view
    }

    pub fn iterate_neighbors_in(&self, v: V, f: impl FnMut(V)) {
        self.in_view.iterate_neighbors(v, f)
    }

    pub fn iterate_neighbors_out(&self, v: V, f: impl FnMut(V)) {
        self.out_view.iterate_neighbors(v, f)
    }

    pub fn get_degree_in(&self, v: V) -> usize {
        self.in_view.get_degree(v)
    }

    pub fn get_degree_out(&self, v: V) -> usize {
        self.out_view.get_degree(v)
    }

    pub fn iterate_neighbors_in_range(&self, v1: V, v2: V, f: impl FnMut(V, V)) {
        self.in_view.iterate_neighbors_range(v1, v2, f)
    }

    pub fn iterate_neighbors_out_range(&self, v1: V, v2: V, f: impl FnMut(V, V)) {
        self.out_view.iterate_neighbors_range(v1, v2, f)
    }

    pub fn iterate_neighbors_in_range_in_level(
        &self,
        v1: V,
        v2: V,
        level: usize,
        f: impl FnMut(V, V) -> crate::Step,
    ) {
        self.in_view.iterate_neighbors_range_in_level(v1, v2, level, f)
    }

    pub fn iterate_neighbors_out_range_in_level(
        &self,
        v1: V,
        v2: V,
        level: usize,
        f: impl FnMut(V, V) -> crate::Step,
    ) {
        self.out_view.iterate_neighbors_range_in_level(v1, v2, level, f)
    }

    pub fn sample_neighbors_in_range_density_aware(
        &self,
        v1: V,
        v2: V,
        k: usize,
        f: impl FnMut(V, V, usize),
    ) {
        self.in_view.sample_neighbors_range_density_aware(v1, v2, k, f)
    }

    pub fn sample_neighbors_out_range_density_aware(
        &self,
        v1: V,
        v2: V,
        k: usize,
        f: impl FnMut(V, V, usize),
    ) {
        self.out_view.sample_neighbors_range_density_aware(v1, v2, k, f)
    }

    /// Builds the non-empty filters for both directions.
    pub fn build_nonempty_bitmaps(&mut self) {
        self.in_view.build_nonempty_bitmaps();
        self.out_view.build_nonempty_bitmaps();
    }
}
