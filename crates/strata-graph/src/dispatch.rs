//! Parallel batch fan-out.
//!
//! An input batch is spread over `dispatch_thread_count` scoped workers
//! pulling 4096-edge chunks from a shared cursor (dynamic scheduling, so
//! skew in per-edge cost does not idle workers). Each worker's index is
//! its MWBB writer id in every partition it touches.

use std::sync::atomic::{AtomicUsize, Ordering};
use strata_core::{Edge, EdgeWeight, VertexId};

pub(crate) const DISPATCH_CHUNK: usize = 4096;

pub(crate) fn dispatch_batch<V: VertexId, W: EdgeWeight>(
    threads: usize,
    edges: &[Edge<V, W>],
    push: impl Fn(Edge<V, W>, usize) + Sync,
) {
    if edges.is_empty() {
        return;
    }
    if threads <= 1 {
        for e in edges {
            push(*e, 0);
        }
        return;
    }

    let cursor = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for tid in 0..threads {
            let cursor = &cursor;
            let push = &push;
            scope.spawn(move || loop {
                let start = cursor.fetch_add(DISPATCH_CHUNK, Ordering::Relaxed);
                if start >= edges.len() {
                    break;
                }
                let end = (start + DISPATCH_CHUNK).min(edges.len());
                for e in &edges[start..end] {
                    push(*e, tid);
                }
            });
        }
    });
}
