//! strata-graph: a dynamic graph ingestion and query engine.
//!
//! Streaming edges are partitioned by source vertex across sort-based
//! memory partitions; each partition's sorter thread incrementally folds
//! the ingest buffer into a small hierarchy of sorted runs with group
//! indexes, so analytic traversals get bounded search fan-out while
//! ingestion keeps running.
//!
//! # Architecture
//!
//! ```text
//! producers ──> Graph::add_edge ──routes by source──┐
//!                                                    ▼
//!   ┌────────────────────── SortedPartition (one per vertex range) ───┐
//!   │  BatchBuffer (multi-writer, visible prefix)                     │
//!   │      │ visible blocks                                           │
//!   │      ▼                                                          │
//!   │  sorter thread: sort mini-batches ── tiered merge ── indexes    │
//!   │  (steals from idle peers through a gate)                        │
//!   └────────────────────────────────────────────────────────────────┘
//!                                                    │ freeze
//!                                                    ▼
//!             FrozenGraph: neighbors / degree / range / sample /
//!                          in-order queries, in parallel
//! ```
//!
//! # Example
//!
//! ```no_run
//! use strata_core::{Edge, GraphConfig};
//! use strata_graph::Graph;
//!
//! # fn main() -> strata_core::Result<()> {
//! let mut config = GraphConfig::default();
//! config.init_vertex_count = 1 << 20;
//!
//! let mut graph: Graph<u64> = Graph::new(config)?;
//! graph.add_edge(Edge::unweighted(1, 2), 0);
//! graph.add_edge(Edge::unweighted(1, 3), 0);
//!
//! graph.collect();
//! let frozen = graph.freeze_for_read();
//! assert_eq!(frozen.get_degree(1), 2);
//! frozen.unfreeze_for_write();
//! # Ok(())
//! # }
//! ```

mod dispatch;
pub mod graph;
pub mod partition;
mod sorter;
pub mod topology;
mod two_way;
mod undirected;
pub mod view;

pub use graph::Graph;
pub use partition::{PartitionReader, PartitionStats, RunState, SortedPartition, Step};
pub use two_way::{FrozenTGraph, TGraph};
pub use undirected::{FrozenUGraph, UGraph};
pub use view::FrozenGraph;

// Re-export the core types callers need at every call site.
pub use strata_core::{Edge, EdgeOrder, EdgeTag, EdgeWeight, GraphConfig, VertexId};
