//! The graph orchestrator: routes edges to partitions, extends the
//! partition list on demand, owns the sorter threads, and drives the
//! freeze/unfreeze handshake.

use crate::partition::SortedPartition;
use crate::sorter::{sorter_loop, FreezeSignal, Latch};
use crate::topology::{self, CoreSet};
use crate::view::FrozenGraph;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use strata_core::{div_up, Edge, EdgeOrder, EdgeWeight, Error, GraphConfig, Result, VertexId};

/// State shared between the graph handle and its sorter threads.
pub(crate) struct GraphInner<V: VertexId, W: EdgeWeight = ()> {
    config: GraphConfig,
    part_width: usize,
    order: EdgeOrder,
    role: u32,
    parts: RwLock<Vec<Arc<SortedPartition<V, W>>>>,
    vertex_count: AtomicUsize,
    max_vertex_count: AtomicUsize,
    signal: FreezeSignal,
    cores: Mutex<CoreSet>,
    numa_nodes: usize,
    total_sleep_ms: AtomicU64,
}

impl<V: VertexId, W: EdgeWeight> GraphInner<V, W> {
    pub fn partition(&self, pid: usize) -> Arc<SortedPartition<V, W>> {
        Arc::clone(&self.parts.read()[pid])
    }

    pub fn parts(&self) -> &RwLock<Vec<Arc<SortedPartition<V, W>>>> {
        &self.parts
    }

    pub fn signal(&self) -> &FreezeSignal {
        &self.signal
    }

    pub fn role(&self) -> u32 {
        self.role
    }

    pub fn part_width(&self) -> usize {
        self.part_width
    }

    pub fn bind_core(&self) -> bool {
        self.config.bind_core
    }

    pub fn note_sleep(&self, millis: u64) {
        self.total_sleep_ms.fetch_add(millis, Ordering::Relaxed);
    }

    /// NUMA node for partition `pid`: interleave across nodes, with the
    /// graph role flipping the assignment so the two directions of a
    /// two-way graph land on opposite sockets.
    fn numa_node_for(&self, pid: usize) -> usize {
        ((pid % self.numa_nodes) ^ self.role as usize) % self.numa_nodes
    }

    /// One steal rotation on behalf of the idle sorter of `self_pid`.
    /// Visits peers from `cursor`, stopping at the first success or
    /// after coming back around to `self_pid` (a rest round).
    pub fn steal_round(&self, self_pid: usize, cursor: &mut usize) -> bool {
        let parts = self.parts.read();
        let n = parts.len();
        if n <= 1 {
            return false;
        }
        for _ in 0..n {
            let c = *cursor % n;
            *cursor = (c + 1) % n;
            if c == self_pid {
                return false;
            }
            if parts[c].try_steal() {
                tracing::trace!(role = self.role, thief = self_pid, victim = c, "stole a sort slice");
                return true;
            }
        }
        false
    }
}

/// A dynamic graph over one edge direction: an ordered set of
/// sort-based memory partitions spanning the vertex space, each with a
/// dedicated sorter thread.
///
/// Ingestion (`add_edge`) is callable from many dispatcher threads, one
/// writer slot each. Analysis requires the freeze handshake:
/// [`Graph::collect`] then [`Graph::freeze_for_read`], which returns the
/// view all query methods live on. Both take `&mut self`, so the borrow
/// checker rules out appends racing collection or analysis.
pub struct Graph<V: VertexId, W: EdgeWeight = ()> {
    inner: Arc<GraphInner<V, W>>,
    sorters: Mutex<Vec<JoinHandle<()>>>,
}

impl<V: VertexId, W: EdgeWeight> Graph<V, W> {
    /// Opens a source-ordered graph with role 1 (the default for a
    /// standalone instance).
    pub fn new(config: GraphConfig) -> Result<Self> {
        Self::with_options(config, EdgeOrder::BySource, 1)
    }

    /// Opens a graph with an explicit ordering policy and NUMA role.
    pub fn with_options(config: GraphConfig, order: EdgeOrder, role: u32) -> Result<Self> {
        config.validate()?;

        let numa_nodes = topology::numa_node_count();
        let cores = if config.bind_numa {
            topology::cores_on_node(role as usize % numa_nodes)
        } else {
            topology::all_cores()
        };
        let mut core_set = CoreSet::new(cores);
        // The main thread claims one core up front.
        core_set.allocate();

        tracing::info!(
            role,
            ?order,
            partition_size = config.partition_size,
            buffer_size = config.effective_buffer_size(),
            sort_batch_size = config.sort_batch_size,
            dispatchers = config.dispatch_thread_count,
            "opening graph"
        );

        let graph = Self {
            inner: Arc::new(GraphInner {
                part_width: config.partition_size,
                order,
                role,
                parts: RwLock::new(Vec::new()),
                vertex_count: AtomicUsize::new(config.init_vertex_count),
                max_vertex_count: AtomicUsize::new(0),
                signal: FreezeSignal::new(),
                cores: Mutex::new(core_set),
                numa_nodes,
                total_sleep_ms: AtomicU64::new(0),
                config,
            }),
            sorters: Mutex::new(Vec::new()),
        };

        let initial = div_up(
            graph.inner.config.init_vertex_count,
            graph.inner.part_width,
        );
        graph.extend_to(initial);
        Ok(graph)
    }

    pub(crate) fn inner(&self) -> &Arc<GraphInner<V, W>> {
        &self.inner
    }

    /// Grows the partition list to `needed` entries, spawning one sorter
    /// thread per new partition, then waits until every new sorter has
    /// taken its reader mutex (so a freeze issued right after this call
    /// synchronizes correctly).
    fn extend_to(&self, needed: usize) {
        let mut latches = Vec::new();
        {
            let mut parts = self.inner.parts.write();
            while parts.len() < needed {
                let pid = parts.len();
                let node = self.inner.numa_node_for(pid);
                parts.push(Arc::new(SortedPartition::new(
                    pid,
                    (pid * self.inner.part_width) as u64,
                    node,
                    self.inner.order,
                    &self.inner.config,
                )));

                let core = self.inner.cores.lock().allocate();
                if core.is_none() && self.inner.config.bind_core {
                    tracing::warn!(role = self.inner.role, pid, "no core left to pin sorter");
                }
                let latch = Arc::new(Latch::new());
                let handle = std::thread::Builder::new()
                    .name(format!("strata-sorter-{}-{}", self.inner.role, pid))
                    .spawn({
                        let inner = Arc::clone(&self.inner);
                        let latch = Arc::clone(&latch);
                        move || sorter_loop(inner, pid, core, latch)
                    })
                    .expect("failed to spawn sorter thread");
                self.sorters.lock().push(handle);
                latches.push(latch);

                tracing::debug!(role = self.inner.role, pid, node, ?core, "partition added");
            }
            self.inner
                .max_vertex_count
                .store(parts.len() * self.inner.part_width, Ordering::Release);
        }
        for latch in latches {
            latch.wait();
        }
    }

    /// Non-blocking append through MWBB writer slot `writer`. Callable
    /// from many dispatcher threads, at most one per writer slot.
    ///
    /// # Panics
    /// When the source vertex is outside the configured range and
    /// `auto_extend` is off, or on batch-buffer overflow.
    #[inline]
    pub fn add_edge(&self, e: Edge<V, W>, writer: usize) {
        if self.inner.config.auto_extend {
            let max_v = e.from.to_u64().max(e.to.to_u64()) as usize;
            if max_v >= self.inner.vertex_count.load(Ordering::Relaxed) {
                self.inner.vertex_count.fetch_max(max_v + 1, Ordering::Relaxed);
            }
            if max_v >= self.inner.max_vertex_count.load(Ordering::Acquire) {
                self.extend_to(max_v / self.inner.part_width + 1);
            }
        }

        let pid = e.from.index() / self.inner.part_width;
        let parts = self.inner.parts.read();
        match parts.get(pid) {
            Some(part) => part.add_edge(e, writer),
            None => panic!(
                "{}",
                Error::VertexOutOfRange {
                    vertex: e.from.to_u64(),
                    limit: (parts.len() * self.inner.part_width) as u64,
                }
            ),
        }
    }

    /// Fans a batch out over the configured dispatcher threads, each
    /// calling [`Graph::add_edge`] under its own writer id.
    pub fn add_edge_batch(&self, edges: &[Edge<V, W>]) {
        crate::dispatch::dispatch_batch(
            self.inner.config.dispatch_thread_count,
            edges,
            |e, tid| self.add_edge(e, tid),
        );
    }

    /// Quiescent compaction of every partition's batch buffer. After
    /// this, every pushed edge is either in the visible prefix or in the
    /// unsorted tail the queries scan.
    ///
    /// Exclusive access proves the producers are done.
    pub fn collect(&mut self) {
        let parts = self.inner.parts.read();
        for part in parts.iter() {
            part.collect();
        }
        tracing::debug!(role = self.inner.role, partitions = parts.len(), "collected");
    }

    /// Raises the read flag without blocking. Sorters finish draining
    /// their visible prefixes and release their reader mutexes.
    pub fn freeze_for_read_async(&self) {
        self.inner.signal.set_read_mode(true);
    }

    /// Blocks until every partition is fully sorted and its reader mutex
    /// acquired, then returns the query view. Dropping the view (or
    /// calling [`FrozenGraph::unfreeze_for_write`]) resumes ingestion.
    pub fn wait_frozen(&mut self) -> FrozenGraph<'_, V, W> {
        FrozenGraph::wait(self)
    }

    /// [`Graph::freeze_for_read_async`] followed by [`Graph::wait_frozen`].
    pub fn freeze_for_read(&mut self) -> FrozenGraph<'_, V, W> {
        self.freeze_for_read_async();
        self.wait_frozen()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.vertex_count.load(Ordering::Relaxed)
    }

    /// Total edges accepted so far. Exact once producers are quiescent
    /// (after `collect`).
    pub fn edge_count(&self) -> usize {
        self.inner
            .parts
            .read()
            .iter()
            .map(|p| p.total_len())
            .sum()
    }

    pub fn partition_count(&self) -> usize {
        self.inner.parts.read().len()
    }

    pub fn order(&self) -> EdgeOrder {
        self.inner.order
    }

    /// Cumulative 5 ms idle sleeps taken by this graph's sorters.
    pub fn total_sleep_millis(&self) -> u64 {
        self.inner.total_sleep_ms.load(Ordering::Relaxed)
    }
}

impl<V: VertexId, W: EdgeWeight> Drop for Graph<V, W> {
    fn drop(&mut self) {
        self.inner.signal.request_stop();
        for handle in self.sorters.lock().drain(..) {
            let _ = handle.join();
        }
        tracing::debug!(
            role = self.inner.role,
            sleep_ms = self.total_sleep_millis(),
            "graph shut down"
        );
    }
}
