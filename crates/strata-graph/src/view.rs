//! Frozen read views.
//!
//! Analysis happens through a [`FrozenGraph`], obtained from
//! [`Graph::freeze_for_read`]. The view owns one reader-mutex guard per
//! partition (the sorters released them after fully sorting their
//! visible prefixes), so possession of the view *is* the proof that
//! queries are safe. It mutably borrows the graph, so ingestion cannot
//! race analysis either. Dropping the view clears the read flag and
//! wakes the sorters.

use crate::graph::Graph;
use crate::partition::{PartitionReader, PartitionStats, RunState, SortedPartition, Step};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use rayon::prelude::*;
use std::sync::Arc;
use strata_core::{Edge, EdgeWeight, VertexId};

type StateGuard = ArcMutexGuard<RawMutex, RunState>;

/// Read guard over a whole graph; all query methods live here.
pub struct FrozenGraph<'g, V: VertexId, W: EdgeWeight = ()> {
    graph: &'g Graph<V, W>,
    parts: Vec<Arc<SortedPartition<V, W>>>,
    guards: Vec<StateGuard>,
}

impl<'g, V: VertexId, W: EdgeWeight> FrozenGraph<'g, V, W> {
    /// Blocks until every partition's reader mutex is acquired. The
    /// partition list is pinned for the life of the view (auto-extend
    /// cannot run concurrently: the graph is mutably borrowed).
    pub(crate) fn wait(graph: &'g mut Graph<V, W>) -> Self {
        let parts: Vec<_> = graph.inner().parts().read().clone();
        let guards: Vec<StateGuard> = parts
            .iter()
            .map(|p| {
                let mut guard = p.state().lock_arc();
                // The guard usually arrives fully drained (the sorter
                // releases it only once the visible prefix is sorted),
                // but edges published between the sorter's release and
                // this acquisition are folded in here, on the freezing
                // thread, under the same mutex.
                while p.sort_tick(&mut guard) {}
                debug_assert!(p.visible_sorted(&guard));
                guard
            })
            .collect();
        tracing::debug!(
            role = graph.inner().role(),
            partitions = parts.len(),
            "graph frozen for read"
        );
        Self {
            graph: &*graph,
            parts,
            guards,
        }
    }

    /// Explicit unfreeze; equivalent to dropping the view.
    pub fn unfreeze_for_write(self) {}

    fn reader(&self, pid: usize) -> PartitionReader<'_, V, W> {
        PartitionReader::new(&self.parts[pid], &self.guards[pid])
    }

    fn pid_of(&self, v: u64) -> usize {
        let pid = v as usize / self.graph.inner().part_width();
        assert!(
            pid < self.parts.len(),
            "vertex {} beyond the partitioned range",
            v
        );
        pid
    }

    /// Partition span `[pid_of(v1), pid_of(v2 - 1)]` clamped to existing
    /// partitions; empty when the range is.
    fn pid_range(&self, v1: u64, v2: u64) -> std::ops::RangeInclusive<usize> {
        if v1 >= v2 || self.parts.is_empty() {
            #[allow(clippy::reversed_empty_ranges)]
            return 1..=0;
        }
        let width = self.graph.inner().part_width() as u64;
        let pid1 = ((v1 / width) as usize).min(self.parts.len() - 1);
        let pid2 = (((v2 - 1) / width) as usize).min(self.parts.len() - 1);
        pid1..=pid2
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Calls `f` with every neighbor of `v`. Order across runs is
    /// unspecified; within a run it is deterministic.
    pub fn iterate_neighbors(&self, v: V, f: impl FnMut(V)) {
        self.reader(self.pid_of(v.to_u64())).iterate_neighbors(v, f)
    }

    /// As [`Self::iterate_neighbors`], but `f` returns whether to keep
    /// going; returns false if `f` broke out.
    pub fn iterate_neighbors_while(&self, v: V, f: impl FnMut(V) -> bool) -> bool {
        self.reader(self.pid_of(v.to_u64()))
            .iterate_neighbors_while(v, f)
    }

    /// Neighbors of `v` in ascending target order (requires the
    /// `(from, to)` ordering policy).
    pub fn iterate_neighbors_in_order(&self, v: V, f: impl FnMut(V)) {
        self.reader(self.pid_of(v.to_u64()))
            .iterate_neighbors_in_order(v, f)
    }

    pub fn get_degree(&self, v: V) -> usize {
        self.reader(self.pid_of(v.to_u64())).degree(v)
    }

    /// Every edge out of `v`, unsorted tail included. For tests and
    /// debugging.
    pub fn neighbors_vec(&self, v: V) -> Vec<Edge<V, W>> {
        self.reader(self.pid_of(v.to_u64())).neighbors_vec(v)
    }

    /// Calls `f(from, to)` for every edge with source in `[v1, v2)`.
    pub fn iterate_neighbors_range(&self, v1: V, v2: V, mut f: impl FnMut(V, V)) {
        let (v1, v2) = (v1.to_u64(), v2.to_u64());
        for pid in self.pid_range(v1, v2) {
            self.reader(pid).iterate_range(v1, v2, &mut f);
        }
    }

    /// Range iteration pinned to one run level, with the [`Step`]
    /// control contract.
    pub fn iterate_neighbors_range_in_level(
        &self,
        v1: V,
        v2: V,
        level: usize,
        mut f: impl FnMut(V, V) -> Step,
    ) {
        let (v1, v2) = (v1.to_u64(), v2.to_u64());
        for pid in self.pid_range(v1, v2) {
            self.reader(pid).iterate_level_ctl(v1, v2, level, &mut f);
        }
    }

    /// Delivers up to `k` neighbors per source in `[v1, v2)` as
    /// `f(from, to, i)`, fast-pathing sources whose first-run bucket is
    /// already dense enough.
    pub fn sample_neighbors_range_density_aware(
        &self,
        v1: V,
        v2: V,
        k: usize,
        mut f: impl FnMut(V, V, usize),
    ) {
        let (v1, v2) = (v1.to_u64(), v2.to_u64());
        for pid in self.pid_range(v1, v2) {
            self.reader(pid).sample_range_density_aware(v1, v2, k, &mut f);
        }
    }

    /// Builds the optional "possibly non-empty" vertex filters, one
    /// partition per rayon task. Conservative: a set bit means edges may
    /// exist; queries on unset bits return empty immediately. Dropped on
    /// unfreeze.
    pub fn build_nonempty_bitmaps(&mut self) {
        let parts = &self.parts;
        // The guards themselves stay on this thread (they are not Send);
        // the rayon tasks only borrow the run states behind them.
        let states: Vec<&mut RunState> = self.guards.iter_mut().map(|g| &mut **g).collect();
        states
            .into_par_iter()
            .enumerate()
            .for_each(|(pid, state)| parts[pid].build_nonempty(state));
    }

    /// Per-partition run statistics.
    pub fn partition_stats(&self) -> Vec<PartitionStats> {
        self.parts
            .iter()
            .zip(self.guards.iter())
            .map(|(part, guard)| part.stats(guard))
            .collect()
    }
}

impl<V: VertexId, W: EdgeWeight> Drop for FrozenGraph<'_, V, W> {
    fn drop(&mut self) {
        for guard in self.guards.iter_mut() {
            guard.invalidate_nonempty();
        }
        // Clear the flag before the guards unlock (released after this
        // body), so waking sorters observe write mode directly.
        self.graph.inner().signal().set_read_mode(false);
    }
}
