//! strata-buffer: the multi-writer batch buffer (MWBB).
//!
//! One buffer backs one graph partition. Any number of dispatcher
//! threads append edges through per-writer sub-buffers with no shared
//! mutable state on the hot path; a single reader (the partition's
//! sorter) observes a monotonically growing contiguous prefix.

mod batch;

pub use batch::{BatchBuffer, MAX_WRITERS};
