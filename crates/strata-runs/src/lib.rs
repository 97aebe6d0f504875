//! strata-runs: the sorted-run toolkit.
//!
//! A partition's batch is incrementally sorted into a small hierarchy of
//! sorted runs. This crate holds the pieces that make that cheap to
//! maintain and fast to query:
//!
//! - [`MergeableRuns`]: the bounded list of run boundaries, supporting
//!   append and tail-merge;
//! - [`GroupKey`] / [`build_group_index`] / [`BucketIndex`]: per-run
//!   bucketed offset tables mapping a source vertex to the subrange of
//!   the run that can contain it;
//! - [`sort`]: cache-aware in-place sorting and sorted-prefix merging;
//! - [`search`]: the binary and exponential searches the query paths
//!   lean on.
//!
//! Everything here is single-threaded and allocation-light; concurrency
//! is the caller's concern.

pub mod index;
pub mod runs;
pub mod search;
pub mod sort;

pub use index::{build_group_index, BucketIndex, GroupKey};
pub use runs::{MergeableRuns, MAX_RUNS};

/// Target L2 cache footprint used to size sort buckets.
pub const L2_CACHE_BYTES: usize = 1024 * 1024;
