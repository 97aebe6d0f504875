use crate::div_up;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Upper bound on MWBB writer slots (dispatcher threads) per partition.
pub const MAX_DISPATCH_THREADS: usize = 16;

/// Upper bound on `buffer_size / sort_batch_size`, i.e. the number of
/// publishable blocks in one partition's batch buffer.
pub const MAX_BLOCKS_PER_BUFFER: usize = 65_536;

/// Engine configuration, shared by every partition of a graph.
///
/// `buffer_size` is rounded up to a power of two at graph construction;
/// all validation runs against that effective value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Extend the partition list when an edge names a vertex beyond the
    /// current range. With this off, such an edge is a fatal error.
    pub auto_extend: bool,

    /// Pin each sorter thread to exactly one logical core.
    pub bind_core: bool,

    /// Restrict thread placement to the NUMA node matching the graph
    /// role, interleaving the two directions of a two-way graph across
    /// sockets.
    pub bind_numa: bool,

    /// Number of batch buffers per partition. Kept for forward
    /// compatibility; the effective value in this engine is 1.
    pub buffer_count: usize,

    /// Per-partition batch capacity in edges (power of two enforced).
    pub buffer_size: usize,

    /// Number of parallel dispatchers used by batch fan-out; also the
    /// number of MWBB writer slots per partition.
    pub dispatch_thread_count: usize,

    /// Per-run group index granularity: one index entry per
    /// `index_ratio` edges for runs past the first. The first run always
    /// carries a per-vertex index.
    pub index_ratio: usize,

    /// Initial vertex count; the initial partition count is
    /// `ceil(init_vertex_count / partition_size)`.
    pub init_vertex_count: usize,

    /// Size-tiering threshold for run compaction. A run is merged with
    /// everything newer once `max(run_len, new_len) * merge_multiplier`
    /// no longer exceeds the combined length.
    pub merge_multiplier: f64,

    /// Source-vertex width of one partition.
    pub partition_size: usize,

    /// Minimum unit of one sort tick, and the MWBB publication block
    /// size.
    pub sort_batch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            auto_extend: true,
            bind_core: false,
            bind_numa: true,
            buffer_count: 1,
            buffer_size: 1024 * 1024,
            dispatch_thread_count: 4,
            index_ratio: 8,
            init_vertex_count: 0,
            merge_multiplier: 2.0,
            partition_size: 128 * 1024,
            sort_batch_size: 1024,
        }
    }
}

impl GraphConfig {
    /// `buffer_size` rounded up to the next power of two, as used by the
    /// engine.
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.next_power_of_two()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.partition_size == 0 {
            return Err(Error::Config("partition_size must be > 0".to_string()));
        }

        if self.sort_batch_size == 0 {
            return Err(Error::Config("sort_batch_size must be > 0".to_string()));
        }

        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be > 0".to_string()));
        }

        let buffer_size = self.effective_buffer_size();

        if buffer_size % self.sort_batch_size != 0 {
            return Err(Error::Config(format!(
                "buffer_size ({} effective) must be a multiple of sort_batch_size ({})",
                buffer_size, self.sort_batch_size
            )));
        }

        if buffer_size / self.sort_batch_size > MAX_BLOCKS_PER_BUFFER {
            return Err(Error::Config(format!(
                "buffer_size / sort_batch_size ({}) exceeds {}",
                buffer_size / self.sort_batch_size,
                MAX_BLOCKS_PER_BUFFER
            )));
        }

        if !self.index_ratio.is_power_of_two() {
            return Err(Error::Config(format!(
                "index_ratio ({}) must be a power of two",
                self.index_ratio
            )));
        }

        if self.sort_batch_size % self.index_ratio != 0 {
            return Err(Error::Config(format!(
                "sort_batch_size ({}) must be a multiple of index_ratio ({})",
                self.sort_batch_size, self.index_ratio
            )));
        }

        if self.dispatch_thread_count == 0 || self.dispatch_thread_count > MAX_DISPATCH_THREADS {
            return Err(Error::Config(format!(
                "dispatch_thread_count ({}) must be in [1, {}]",
                self.dispatch_thread_count, MAX_DISPATCH_THREADS
            )));
        }

        // Every dispatcher holds one active block per partition.
        if self.dispatch_thread_count * self.sort_batch_size > buffer_size {
            return Err(Error::Config(format!(
                "buffer_size ({} effective) cannot hold {} writer blocks of sort_batch_size {}",
                buffer_size, self.dispatch_thread_count, self.sort_batch_size
            )));
        }

        if self.merge_multiplier < 1.0 {
            return Err(Error::Config(format!(
                "merge_multiplier ({}) must be >= 1.0",
                self.merge_multiplier
            )));
        }

        Ok(())
    }

    /// Configuration for an undirected graph: one graph instance,
    /// ingesting both directions of each edge, sized from a target
    /// thread count.
    pub fn for_undirected(vertex_count: usize, edge_count: usize, thread_count: usize) -> Self {
        let dispatch_thread_count = div_up(thread_count, 8).clamp(1, MAX_DISPATCH_THREADS);
        let partition_count = (thread_count.saturating_sub(dispatch_thread_count)).max(1);
        let partition_size = div_up(vertex_count.max(1), partition_count);

        let sort_batch_size = 128;
        Self {
            auto_extend: false,
            bind_core: false,
            bind_numa: false,
            buffer_count: 1,
            // Both directions land in the same graph, so size for 2x the
            // input edges plus the dispatchers' in-flight blocks.
            buffer_size: (2 * edge_count + dispatch_thread_count * sort_batch_size)
                .next_power_of_two(),
            dispatch_thread_count,
            index_ratio: 8,
            init_vertex_count: vertex_count,
            merge_multiplier: 2.0,
            partition_size,
            sort_batch_size,
        }
    }

    /// Configuration for a directed two-way graph: two graph instances
    /// (in-edges and out-edges) splitting the sorter threads between
    /// them.
    pub fn for_two_way(vertex_count: usize, edge_count: usize, thread_count: usize) -> Self {
        let (dispatch_thread_count, sorter_threads) = if thread_count < 4 {
            (1, thread_count)
        } else {
            let d = (div_up(thread_count, 10) * 2).min(MAX_DISPATCH_THREADS);
            (d, thread_count - d)
        };

        // The in- and out-graph each get half of the sorter threads.
        let partition_count = (sorter_threads / 2).max(1);
        let partition_size = div_up(vertex_count.max(1), partition_count);

        let sort_batch_size = 128;
        Self {
            auto_extend: false,
            bind_core: false,
            bind_numa: true,
            buffer_count: 1,
            buffer_size: (edge_count + dispatch_thread_count * sort_batch_size)
                .next_power_of_two(),
            dispatch_thread_count,
            index_ratio: 8,
            init_vertex_count: vertex_count,
            merge_multiplier: 2.0,
            partition_size,
            sort_batch_size,
        }
    }
}
