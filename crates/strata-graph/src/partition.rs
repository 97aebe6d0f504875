//! Sort-based memory partition: one contiguous source-vertex range.
//!
//! A partition buffers edges in its [`BatchBuffer`], and its dedicated
//! sorter incrementally sorts the visible prefix into a bounded
//! hierarchy of sorted runs, deciding at each tick whether to start a
//! new run or fold the tail of the hierarchy into one (size-tiered
//! compaction):
//!
//! ```text
//! batch:  [ run 0 ........ | run 1 .... | run 2 | unsorted tail ]
//! index:  [ per-vertex     | arena slice| arena |               ]
//!           0                            sorted_count    visible
//! ```
//!
//! Run 0 always carries a per-vertex group index; later runs use slices
//! of a packed arena with one entry per `index_ratio` edges. All run
//! state is guarded by the reader mutex: the sorter holds it while
//! ingestion runs, and the frozen read views hold it during analysis.
//!
//! Work stealing: an idle peer sorter may pre-sort a slice of the fresh
//! region beyond the owner's current work through a gate that is only
//! open while the owner is busy with a large sort. The owner later folds
//! the pre-sorted prefix in with an adaptive merge instead of a full
//! sort.

use bitvec::prelude::*;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use strata_buffer::BatchBuffer;
use strata_core::{Edge, EdgeOrder, EdgeWeight, GraphConfig, VertexId};
use strata_runs::search::{exponential_search_source, lower_bound_by_source, source_run_len};
use strata_runs::sort::{adaptive_range_sort, merge_sorted_prefix, small_range_sort};
use strata_runs::{build_group_index, BucketIndex, GroupKey, MergeableRuns};

/// Regions below this size are not worth opening the steal gate for.
pub(crate) const ENABLE_STEAL_THRESHOLD: usize = 8 * 1024;
/// A stealer leaves regions smaller than this alone.
pub(crate) const MIN_STEAL_LEN: usize = 512;
/// Upper bound on one stolen slice.
pub(crate) const MAX_STEAL_LEN: usize = 32 * 1024;

#[inline]
fn source<V: VertexId, W: EdgeWeight>(e: &Edge<V, W>) -> u64 {
    e.from.to_u64()
}

/// Run-hierarchy state, guarded by the partition's reader mutex.
///
/// The sorter mutates it between freezes; frozen read views borrow it
/// for the whole analysis phase. Run membership only ever changes while
/// the mutex is held, so a reader never observes a partial run.
pub struct RunState {
    sorted_count: usize,
    runs: MergeableRuns,
    /// Per-vertex index of run 0, one entry per source vertex.
    first_index: Box<[u32]>,
    /// Packed index arena for runs 1..; the slice for a run starting at
    /// offset `s` begins at arena entry `s >> index_ratio_bits`.
    index_arena: Box<[u32]>,
    /// Conservative "possibly non-empty" filter, built on demand during
    /// a freeze and dropped on unfreeze.
    nonempty: Option<BitVec>,
}

impl RunState {
    fn new(width: usize, capacity: usize, index_ratio: usize) -> Self {
        Self {
            sorted_count: 0,
            runs: MergeableRuns::new(),
            first_index: vec![0u32; width].into_boxed_slice(),
            index_arena: vec![0u32; capacity / index_ratio].into_boxed_slice(),
            nonempty: None,
        }
    }

    pub fn sorted_count(&self) -> usize {
        self.sorted_count
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub(crate) fn invalidate_nonempty(&mut self) {
        self.nonempty = None;
    }
}

/// Binary steal gate plus the stealers' progress mark.
///
/// The gate starts closed; the owner opens it only for the duration of a
/// large sort and re-acquires it before touching anything a stealer may
/// have pre-sorted. `sorted_to` is published with release by whoever
/// advanced it and read with acquire on the other side of the gate.
struct StealGate {
    available: AtomicBool,
    sorted_to: AtomicUsize,
}

impl StealGate {
    fn new() -> Self {
        Self {
            available: AtomicBool::new(false),
            sorted_to: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self) -> bool {
        self.available.swap(false, Ordering::Acquire)
    }

    fn release(&self) {
        self.available.store(true, Ordering::Release);
    }

    /// Blocking acquire; the holder (a stealer) only keeps the gate for
    /// one bounded slice sort.
    fn acquire(&self) {
        while !self.try_acquire() {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }
}

/// Per-partition statistics, surfaced through the frozen view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub sorted_len: usize,
    pub tail_len: usize,
    pub run_count: usize,
}

/// One sort-based memory partition covering sources
/// `[v_start, v_start + width)`.
pub struct SortedPartition<V: VertexId, W: EdgeWeight = ()> {
    pid: usize,
    v_start: u64,
    width: usize,
    order: EdgeOrder,
    sort_batch: usize,
    merge_multiplier: f64,
    index_ratio_bits: u32,
    buffer: BatchBuffer<Edge<V, W>>,
    steal: StealGate,
    state: Arc<Mutex<RunState>>,
}

impl<V: VertexId, W: EdgeWeight> SortedPartition<V, W> {
    pub fn new(pid: usize, v_start: u64, numa_node: usize, order: EdgeOrder, config: &GraphConfig) -> Self {
        let capacity = config.effective_buffer_size();
        Self {
            pid,
            v_start,
            width: config.partition_size,
            order,
            sort_batch: config.sort_batch_size,
            merge_multiplier: config.merge_multiplier,
            index_ratio_bits: config.index_ratio.trailing_zeros(),
            buffer: BatchBuffer::new(
                capacity,
                config.sort_batch_size,
                config.dispatch_thread_count,
                numa_node,
            ),
            steal: StealGate::new(),
            state: Arc::new(Mutex::new(RunState::new(
                config.partition_size,
                capacity,
                config.index_ratio,
            ))),
        }
    }

    pub fn pid(&self) -> usize {
        self.pid
    }

    pub fn v_start(&self) -> u64 {
        self.v_start
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn order(&self) -> EdgeOrder {
        self.order
    }

    pub fn state(&self) -> &Arc<Mutex<RunState>> {
        &self.state
    }

    /// Total edges this partition has accepted (exact when quiescent).
    pub fn total_len(&self) -> usize {
        self.buffer.total_len()
    }

    /// Non-blocking append through MWBB writer slot `writer`.
    #[inline]
    pub fn add_edge(&self, e: Edge<V, W>, writer: usize) {
        debug_assert!(
            e.from.to_u64() >= self.v_start && e.from.to_u64() < self.v_start + self.width as u64,
            "edge {} routed to partition {} covering [{}, {})",
            e.from,
            self.pid,
            self.v_start,
            self.v_start + self.width as u64
        );
        self.buffer.push_into(e, writer);
    }

    /// Quiescent-writer compaction; see [`BatchBuffer::collect`]. The
    /// graph's `&mut self` collect entry point guarantees no concurrent
    /// appends.
    pub fn collect(&self) {
        // SAFETY: caller guarantees producers are quiescent; the sorter
        // may keep reading, which collect tolerates (it only mutates at
        // or above the old visible boundary).
        unsafe { self.buffer.collect() }
    }

    /// True when every visible edge has been folded into a run.
    pub fn visible_sorted(&self, state: &RunState) -> bool {
        self.buffer.visible_len() == state.sorted_count
    }

    fn cmp(&self) -> impl Fn(&Edge<V, W>, &Edge<V, W>) -> CmpOrdering + Copy {
        let order = self.order;
        move |a, b| order.cmp(a, b)
    }

    // ------------------------------------------------------------------
    // Sorting
    // ------------------------------------------------------------------

    /// One sorter tick: if at least one mini-batch of fresh edges is
    /// visible, fold all complete fresh mini-batches into the run
    /// hierarchy. Returns true if work was done.
    pub fn sort_tick(&self, state: &mut RunState) -> bool {
        let visible = self.buffer.visible_len();
        let fresh = visible - state.sorted_count;
        if fresh < self.sort_batch {
            return false;
        }
        self.sort_mini_batches(state, fresh / self.sort_batch);
        true
    }

    /// Picks the merge target: walking runs oldest to newest, the first
    /// run small enough that `max(run, fresh) * multiplier <= total of
    /// it and everything newer` is merged together with all newer runs
    /// and the fresh region. Returns `(start_offset, merged_run_count)`;
    /// a count of zero means "no merge, just append".
    fn merge_target(&self, state: &RunState, fresh_len: usize) -> (usize, usize) {
        let mut total = state.sorted_count + fresh_len;
        let mut count = state.runs.len();
        for (run_start, run_end) in state.runs.iter() {
            let run_len = run_end - run_start;
            if run_len.max(fresh_len) as f64 * self.merge_multiplier <= total as f64 {
                return (run_start, count);
            }
            total -= run_len;
            count -= 1;
        }
        (state.sorted_count, 0)
    }

    fn sort_mini_batches(&self, state: &mut RunState, batch_count: usize) {
        let fresh_len = batch_count * self.sort_batch;
        let new_sorted = state.sorted_count + fresh_len;
        let (merge_start, merged_runs) = self.merge_target(state, fresh_len);
        let cmp = self.cmp();

        // Pre-sorted boundary left by stealers; read before republishing.
        let stolen = self.steal.sorted_to.load(Ordering::Acquire).min(new_sorted);

        let region_start = if merged_runs == 0 { state.sorted_count } else { merge_start };
        let open_gate = new_sorted - region_start > ENABLE_STEAL_THRESHOLD;
        if open_gate {
            // Everything up to `new_sorted` is ours now; stealers may
            // work beyond it while we sort.
            self.steal.sorted_to.store(new_sorted, Ordering::Release);
            self.steal.release();
        }

        // SAFETY: `[region_start, new_sorted)` is below the visible
        // boundary, the reader mutex is held (`&mut RunState` proves
        // it), and any stolen overlap is quiesced: the gate only admits
        // stealers beyond `new_sorted`.
        let region = unsafe { self.buffer.slice_mut(region_start, new_sorted) };

        if merged_runs == 0 {
            if stolen > region_start {
                merge_sorted_prefix(
                    region,
                    stolen - region_start,
                    self.v_start,
                    self.width,
                    source,
                    cmp,
                );
            } else {
                adaptive_range_sort(region, self.v_start, self.width, source, cmp);
            }
            state.runs.append(new_sorted);
        } else {
            let unsorted_from = state.sorted_count.max(stolen) - region_start;
            merge_sorted_prefix(region, unsorted_from, self.v_start, self.width, source, cmp);
            state.runs.append(new_sorted);
            state.runs.merge_last(merged_runs + 1);
        }

        if open_gate {
            // Wait out any in-flight stealer before the next tick can
            // touch its region.
            self.steal.acquire();
        }

        state.sorted_count = new_sorted;
        self.build_index(state, region_start, new_sorted);
        self.debug_check_run(state, region_start, new_sorted);
    }

    /// Called by an idle sorter of another partition. Sorts one bounded
    /// slice of this partition's fresh region in place if the gate is
    /// open and enough fresh edges exist.
    pub fn try_steal(&self) -> bool {
        if !self.steal.try_acquire() {
            return false;
        }
        let mut stole = false;
        let visible = self.buffer.visible_len();
        let from = self.steal.sorted_to.load(Ordering::Acquire);
        if visible - from >= MIN_STEAL_LEN {
            let len = (visible - from).min(MAX_STEAL_LEN);
            // SAFETY: the gate is held and the owner never touches
            // `[sorted_to, visible)` while it is open; the region is
            // below the visible boundary, so no writer mutates it.
            let slice = unsafe { self.buffer.slice_mut(from, from + len) };
            small_range_sort(slice, self.cmp());
            self.steal.sorted_to.store(from + len, Ordering::Release);
            stole = true;
        }
        self.steal.release();
        stole
    }

    fn index_key(&self, bucket_count: usize) -> GroupKey {
        GroupKey::new(bucket_count, self.v_start, self.width)
    }

    /// (Re)builds the group index of the run `[start, end)`.
    fn build_index(&self, state: &mut RunState, start: usize, end: usize) {
        // SAFETY: sorted region below the visible boundary; reader mutex
        // held.
        let run = unsafe { self.buffer.slice(start, end) };
        if start == 0 {
            let key = self.index_key(self.width);
            build_group_index(run, &mut state.first_index, |e| key.key(source(e)));
        } else {
            let lo = start >> self.index_ratio_bits;
            let hi = end >> self.index_ratio_bits;
            let key = self.index_key(hi - lo);
            build_group_index(run, &mut state.index_arena[lo..hi], |e| key.key(source(e)));
        }
    }

    /// Group-index view of the run `[start, end)`.
    fn index_view<'s>(&self, state: &'s RunState, start: usize, end: usize) -> BucketIndex<'s> {
        if start == 0 {
            BucketIndex::new(&state.first_index, self.index_key(self.width))
        } else {
            let lo = start >> self.index_ratio_bits;
            let hi = end >> self.index_ratio_bits;
            BucketIndex::new(&state.index_arena[lo..hi], self.index_key(hi - lo))
        }
    }

    #[cfg(debug_assertions)]
    fn debug_check_run(&self, _state: &RunState, start: usize, end: usize) {
        let run = unsafe { self.buffer.slice(start, end) };
        let cmp = self.cmp();
        assert!(
            run.windows(2).all(|w| cmp(&w[0], &w[1]) != CmpOrdering::Greater),
            "partition {}: run [{start}, {end}) not sorted",
            self.pid
        );
        let hi = self.v_start + self.width as u64;
        assert!(
            run.iter().all(|e| source(e) >= self.v_start && source(e) < hi),
            "partition {}: run [{start}, {end}) holds foreign sources",
            self.pid
        );
    }

    #[cfg(not(debug_assertions))]
    fn debug_check_run(&self, _state: &RunState, _start: usize, _end: usize) {}

    // ------------------------------------------------------------------
    // Freeze-time helpers
    // ------------------------------------------------------------------

    /// Builds the conservative non-empty filter over every run and the
    /// tail. Requires the frozen phase (quiescent writers and sorter).
    pub(crate) fn build_nonempty(&self, state: &mut RunState) {
        let mut bits = bitvec![0; self.width];
        let run_count = state.runs.len();
        {
            let reader = PartitionReader { part: self, state };
            for level in 0..run_count {
                reader.iterate_level_ctl(
                    self.v_start,
                    self.v_start + self.width as u64,
                    level,
                    |from, _to| {
                        bits.set((from.to_u64() - self.v_start) as usize, true);
                        Step::SkipToNextVertex
                    },
                );
            }
            for e in reader.tail() {
                bits.set((source(e) - self.v_start) as usize, true);
            }
        }
        state.nonempty = Some(bits);
    }

    /// Per-partition statistics for the frozen view.
    pub(crate) fn stats(&self, state: &RunState) -> PartitionStats {
        PartitionStats {
            sorted_len: state.sorted_count,
            tail_len: self.buffer.tail_len(),
            run_count: state.runs.len(),
        }
    }
}

/// Return contract of the controllable range iterators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Break,
    /// Resume at the next source vertex, found by exponential search.
    SkipToNextVertex,
    /// Resume at `current_source + n`; `Jump(0)` behaves like
    /// [`Step::Continue`].
    Jump(u64),
}

/// Read-side view of one partition, valid while the reader mutex guard
/// it borrows from is held (i.e. inside a frozen phase).
pub struct PartitionReader<'a, V: VertexId, W: EdgeWeight = ()> {
    part: &'a SortedPartition<V, W>,
    state: &'a RunState,
}

impl<'a, V: VertexId, W: EdgeWeight> PartitionReader<'a, V, W> {
    pub fn new(part: &'a SortedPartition<V, W>, state: &'a RunState) -> Self {
        Self { part, state }
    }

    fn run(&self, start: usize, end: usize) -> &'a [Edge<V, W>] {
        // SAFETY: the run lies inside the sorted prefix, the reader
        // mutex is held for `'a`, and the frozen protocol quiesces every
        // mutator.
        unsafe { self.part.buffer.slice(start, end) }
    }

    /// The unsorted tail (pending sub-block after the last collect).
    fn tail(&self) -> &'a [Edge<V, W>] {
        // SAFETY: frozen phase, writers quiescent.
        unsafe { self.part.buffer.ready_tail() }
    }

    /// Runs oldest-first, each with its group-index view.
    fn levels(&self) -> impl Iterator<Item = (&'a [Edge<V, W>], BucketIndex<'a>)> + '_ {
        self.state
            .runs
            .iter()
            .map(move |(s, e)| (self.run(s, e), self.part.index_view(self.state, s, e)))
    }

    fn possibly_empty(&self, v: V) -> bool {
        match &self.state.nonempty {
            Some(bits) => {
                let off = v.to_u64().wrapping_sub(self.part.v_start) as usize;
                off < bits.len() && !bits[off]
            }
            None => false,
        }
    }

    /// Clamps `[v1, v2)` to this partition's vertex range.
    fn clamp(&self, v1: u64, v2: u64) -> (u64, u64) {
        let lo = self.part.v_start;
        let hi = self.part.v_start + self.part.width as u64;
        (v1.max(lo), v2.min(hi))
    }

    /// Calls `f` with the target of every edge out of `v`; `f` returns
    /// whether to continue. Yields run by run (oldest first), then the
    /// unsorted tail; order across runs is unspecified.
    pub fn iterate_neighbors_while(&self, v: V, mut f: impl FnMut(V) -> bool) -> bool {
        if self.possibly_empty(v) {
            return true;
        }
        let vu = v.to_u64();
        for (run, index) in self.levels() {
            let bucket = index.bucket(run, vu);
            let mut pos = lower_bound_by_source(bucket, vu, source);
            while pos < bucket.len() && bucket[pos].from == v {
                if !f(bucket[pos].to) {
                    return false;
                }
                pos += 1;
            }
        }
        for e in self.tail() {
            if e.from == v && !f(e.to) {
                return false;
            }
        }
        true
    }

    /// Calls `f` with the target of every edge out of `v`.
    pub fn iterate_neighbors(&self, v: V, mut f: impl FnMut(V)) {
        self.iterate_neighbors_while(v, |to| {
            f(to);
            true
        });
    }

    /// Out-degree of `v`: per-vertex buckets answer in O(1), coarse
    /// buckets via two binary searches, plus a tail scan.
    pub fn degree(&self, v: V) -> usize {
        if self.possibly_empty(v) {
            return 0;
        }
        let vu = v.to_u64();
        let mut degree = self.tail().iter().filter(|e| e.from == v).count();
        for (run, index) in self.levels() {
            let bucket = index.bucket(run, vu);
            if bucket.is_empty() {
                continue;
            }
            if index.is_per_vertex() {
                degree += bucket.len();
            } else {
                degree += source_run_len(bucket, vu, source);
            }
        }
        degree
    }

    /// All edges out of `v`, including the unsorted tail. For tests and
    /// debugging, not for performance.
    pub fn neighbors_vec(&self, v: V) -> Vec<Edge<V, W>> {
        let vu = v.to_u64();
        let mut out: Vec<Edge<V, W>> =
            self.tail().iter().filter(|e| e.from == v).copied().collect();
        for (run, index) in self.levels() {
            let bucket = index.bucket(run, vu);
            let start = lower_bound_by_source(bucket, vu, source);
            out.extend(
                bucket[start..]
                    .iter()
                    .take_while(|e| e.from == v)
                    .copied(),
            );
        }
        out
    }

    /// Iterates `(from, to)` over sources in `[v1, v2)` within run
    /// `level`, honoring the [`Step`] contract. Skips use exponential
    /// search: the next relevant source is usually close.
    pub fn iterate_level_ctl(
        &self,
        v1: u64,
        v2: u64,
        level: usize,
        mut f: impl FnMut(V, V) -> Step,
    ) {
        if level >= self.state.runs.len() {
            return;
        }
        let (v1, v2) = self.clamp(v1, v2);
        if v1 >= v2 {
            return;
        }

        let (run_start, run_end) = self.state.runs.get(level);
        let run = self.run(run_start, run_end);
        let index = self.part.index_view(self.state, run_start, run_end);

        let (bucket_start, bucket_end) = index.bucket_bounds(v1);
        let mut pos =
            bucket_start + lower_bound_by_source(&run[bucket_start..bucket_end], v1, source);

        while pos < run.len() && source(&run[pos]) < v2 {
            let e = &run[pos];
            match f(e.from, e.to) {
                Step::Continue | Step::Jump(0) => pos += 1,
                Step::Break => return,
                Step::SkipToNextVertex => {
                    pos += exponential_search_source(&run[pos..], source(e) + 1, source);
                }
                Step::Jump(n) => {
                    pos += exponential_search_source(&run[pos..], source(e) + n, source);
                }
            }
        }
    }

    /// Iterates `(from, to)` over sources in `[v1, v2)` across every run
    /// and the unsorted tail.
    pub fn iterate_range(&self, v1: u64, v2: u64, mut f: impl FnMut(V, V)) {
        let (v1, v2) = self.clamp(v1, v2);
        if v1 >= v2 {
            return;
        }
        for level in 0..self.state.runs.len() {
            self.iterate_level_ctl(v1, v2, level, |from, to| {
                f(from, to);
                Step::Continue
            });
        }
        for e in self.tail() {
            let s = source(e);
            if s >= v1 && s < v2 {
                f(e.from, e.to);
            }
        }
    }

    /// Density-aware neighbor sampling: for each source in `[v1, v2)`
    /// deliver up to `k` edges as `f(from, to, i)`.
    ///
    /// Fast path: when run 0's per-vertex bucket already holds `k`
    /// edges, deliver them directly, O(k) with no search. Otherwise the
    /// remainder is pulled from cursors over the later runs (and the
    /// pre-sorted tail), each advanced by exponential search.
    pub fn sample_range_density_aware(
        &self,
        v1: u64,
        v2: u64,
        k: usize,
        mut f: impl FnMut(V, V, usize),
    ) {
        let (v1, v2) = self.clamp(v1, v2);
        if v1 >= v2 || k == 0 {
            return;
        }

        // Tail edges in range, sorted by source so they form one more
        // cursor.
        let mut tail: Vec<Edge<V, W>> = self
            .tail()
            .iter()
            .filter(|e| {
                let s = source(e);
                s >= v1 && s < v2
            })
            .copied()
            .collect();
        tail.sort_unstable_by(|a, b| a.from.cmp(&b.from));

        // Cursors over runs 1.. ; run 0 is served by its per-vertex
        // index below.
        let mut cursors: Vec<(&[Edge<V, W>], usize)> = Vec::new();
        for (level, (run, index)) in self.levels().enumerate() {
            if level == 0 {
                continue;
            }
            let lo_bucket = index.bucket_bounds(v1);
            let hi_bucket = index.bucket_bounds(v2 - 1);
            let start = lo_bucket.0
                + lower_bound_by_source(&run[lo_bucket.0..lo_bucket.1], v1, source);
            let end = hi_bucket.0
                + lower_bound_by_source(&run[hi_bucket.0..hi_bucket.1], v2, source);
            if start < end {
                cursors.push((&run[start..end], 0));
            }
        }
        if !tail.is_empty() {
            cursors.push((&tail, 0));
        }

        let first_run = self.state.runs.iter().next();
        for v in v1..v2 {
            let head = match first_run {
                Some((s, e)) => {
                    let run = self.run(s, e);
                    self.part.index_view(self.state, s, e).bucket(run, v)
                }
                None => &[],
            };
            let mut delivered = 0usize;
            for e in head.iter().take(k) {
                f(e.from, e.to, delivered);
                delivered += 1;
            }
            if delivered == k {
                continue;
            }
            for (edges, pos) in cursors.iter_mut() {
                if *pos < edges.len() && source(&edges[*pos]) < v {
                    *pos += exponential_search_source(&edges[*pos..], v, source);
                }
                while *pos < edges.len() && source(&edges[*pos]) == v {
                    f(edges[*pos].from, edges[*pos].to, delivered);
                    *pos += 1;
                    delivered += 1;
                    if delivered == k {
                        break;
                    }
                }
                if delivered == k {
                    break;
                }
            }
        }
    }

    /// Yields the neighbors of `v` in ascending target order via a
    /// streaming merge over one cursor per run plus the sorted tail.
    /// The cursor set is tiny, so an insertion-sorted array beats a
    /// heap.
    ///
    /// # Panics
    /// If the partition is not `(from, to)`-ordered.
    pub fn iterate_neighbors_in_order(&self, v: V, mut f: impl FnMut(V)) {
        assert!(
            self.part.order.sorts_targets(),
            "iterate_neighbors_in_order requires BySourceTarget ordering"
        );
        let vu = v.to_u64();

        let mut tail: Vec<Edge<V, W>> =
            self.tail().iter().filter(|e| e.from == v).copied().collect();
        tail.sort_unstable_by(|a, b| a.to.cmp(&b.to));

        // One cursor per run positioned at v's first edge.
        let mut cursors: smallvec::SmallVec<[(&[Edge<V, W>], usize); 8]> =
            smallvec::SmallVec::new();
        for (run, index) in self.levels() {
            let bucket = index.bucket(run, vu);
            let start = lower_bound_by_source(bucket, vu, source);
            if start < bucket.len() && bucket[start].from == v {
                cursors.push((&bucket[start..], 0));
            }
        }
        if !tail.is_empty() {
            cursors.push((&tail, 0));
        }

        cursors.sort_unstable_by_key(|(edges, pos)| edges[*pos].to);

        while let Some(&(edges, pos)) = cursors.first() {
            f(edges[pos].to);

            let next = pos + 1;
            if next < edges.len() && edges[next].from == v {
                cursors[0].1 = next;
                // Restore ascending head order by bubbling right.
                let mut i = 0;
                while i + 1 < cursors.len() {
                    let here = cursors[i].0[cursors[i].1].to;
                    let there = cursors[i + 1].0[cursors[i + 1].1].to;
                    if here <= there {
                        break;
                    }
                    cursors.swap(i, i + 1);
                    i += 1;
                }
            } else {
                cursors.remove(0);
            }
        }
    }
}
