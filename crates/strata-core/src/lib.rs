//! strata-core: shared types for the strata dynamic graph engine.
//!
//! Everything here is plain data: vertex identifiers, edges, the ordering
//! policy a graph instance is fixed to, the engine configuration, and the
//! error taxonomy. The concurrent machinery lives in `strata-buffer` and
//! `strata-graph`.

pub mod config;
pub mod edge;
pub mod error;

pub use config::GraphConfig;
pub use edge::{Edge, EdgeOrder, EdgeTag, EdgeWeight, VertexId};
pub use error::{Error, Result};

/// Rounds `num` up to the next multiple of `den`, in division form.
#[inline]
pub fn div_up(num: usize, den: usize) -> usize {
    (num + den - 1) / den
}
