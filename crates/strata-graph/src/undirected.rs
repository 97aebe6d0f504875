//! Undirected composite: one graph fed both directions of every edge.
//!
//! Always `(from, to)`-ordered, so in-order neighbor traversal (the
//! triangle-counting access pattern) works out of the box.

use crate::dispatch::dispatch_batch;
use crate::graph::Graph;
use crate::view::FrozenGraph;
use std::sync::atomic::{AtomicUsize, Ordering};
use strata_core::{Edge, EdgeOrder, EdgeWeight, GraphConfig, Result, VertexId};

pub struct UGraph<V: VertexId, W: EdgeWeight = ()> {
    g: Graph<V, W>,
    edge_count: AtomicUsize,
    dispatch_threads: usize,
}

impl<V: VertexId, W: EdgeWeight> UGraph<V, W> {
    pub fn new(config: GraphConfig) -> Result<Self> {
        let dispatch_threads = config.dispatch_thread_count;
        Ok(Self {
            g: Graph::with_options(config, EdgeOrder::BySourceTarget, 0)?,
            edge_count: AtomicUsize::new(0),
            dispatch_threads,
        })
    }

    /// Appends `(u, v)` and `(v, u)` through writer slot 0.
    pub fn add_edge(&self, e: Edge<V, W>) {
        self.g.add_edge(e, 0);
        self.g.add_edge(e.reverse(), 0);
        self.edge_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fans a batch out over the configured dispatcher threads, each
    /// emitting both directions of its edges.
    pub fn add_edge_batch(&self, edges: &[Edge<V, W>]) {
        self.edge_count.fetch_add(edges.len(), Ordering::Relaxed);
        dispatch_batch(self.dispatch_threads, edges, |e, tid| {
            self.g.add_edge(e, tid);
            self.g.add_edge(e.reverse(), tid);
        });
    }

    pub fn collect(&mut self) {
        self.g.collect();
    }

    pub fn freeze_for_read(&mut self) -> FrozenUGraph<'_, V, W> {
        FrozenUGraph {
            view: self.g.freeze_for_read(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.g.vertex_count()
    }

    /// Undirected edges appended (each stored twice internally).
    pub fn edge_count(&self) -> usize {
        self.edge_count.load(Ordering::Relaxed)
    }

    pub fn total_sleep_millis(&self) -> u64 {
        self.g.total_sleep_millis()
    }
}

/// Read guard over an undirected graph.
pub struct FrozenUGraph<'g, V: VertexId, W: EdgeWeight = ()> {
    view: FrozenGraph<'g, V, W>,
}

impl<V: VertexId, W: EdgeWeight> FrozenUGraph<'_, V, W> {
    pub fn unfreeze_for_write(self) {}

    pub fn view(&self) -> &FrozenGraph<'_, V, W> {
        &self.view
    }

    pub fn iterate_neighbors(&self, v: V, f: impl FnMut(V)) {
        self.view.iterate_neighbors(v, f)
    }

    /// Neighbors of `v` in ascending order; a neighbor reached through
    /// both directions of the same input edge appears once per
    /// direction.
    pub fn iterate_neighbors_in_order(&self, v: V, f: impl FnMut(V)) {
        self.view.iterate_neighbors_in_order(v, f)
    }

    pub fn get_degree(&self, v: V) -> usize {
        self.view.get_degree(v)
    }

    pub fn sample_neighbors_range_density_aware(
        &self,
        v1: V,
        v2: V,
        k: usize,
        f: impl FnMut(V, V, usize),
    ) {
        self.view.sample_neighbors_range_density_aware(v1, v2, k, f)
    }

    pub fn build_nonempty_bitmaps(&mut self) {
        self.view.build_nonempty_bitmaps();
    }
}
