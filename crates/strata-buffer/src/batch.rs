//! Append-only batch buffer with many writers and one reader.
//!
//! # Layout
//!
//! ```text
//! storage (capacity C, block size B):
//! ┌────────┬────────┬────────┬────────┬────────┬───────────────┐
//! │ full   │ full   │ w1 ░░  │ full   │ w0 ░   │ unclaimed ... │
//! └────────┴────────┴────────┴────────┴────────┴───────────────┘
//!            visible prefix ▲            ▲ per-writer partial blocks
//! ```
//!
//! Each writer owns a sub-buffer: a claimed block it fills locally. When
//! the block fills, the writer publishes `latest_written = block end`
//! (release) and claims a fresh block by a fetch-add on `allocated`.
//! The safe prefix for the reader is the *minimum* of all writers'
//! `latest_written`; everything below it is fully written.
//!
//! # Ordering
//!
//! Within one writer, edges appear in push order inside each of its
//! blocks; across writers there is no order (block placement reflects
//! contention on `allocated`). The engine sorts everything anyway.
//!
//! # Concurrency
//!
//! `push_into(_, w)` must be called by at most one thread per writer
//! slot at a time; distinct slots never touch the same address.
//! `collect()` requires quiescent writers. The reader-side accessors are
//! `unsafe` because the region they expose is mutated in place by the
//! sorting protocol; the engine's lock discipline makes them sound.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Upper bound on writer slots per buffer.
pub const MAX_WRITERS: usize = 16;

struct WriterSlot {
    /// Absolute offset of this writer's active block.
    base: AtomicUsize,
    /// Fill count of the active block. Only the owning writer stores it;
    /// `collect` reads it while writers are quiescent.
    len: AtomicUsize,
    /// Absolute offset up to which this writer's writes are published.
    latest_written: AtomicU64,
}

/// Multi-writer batch buffer for one partition.
pub struct BatchBuffer<T> {
    storage: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    block_size: usize,
    allocated: AtomicU64,
    slots: Box<[CachePadded<WriterSlot>]>,
    numa_node: usize,
}

// SAFETY: the storage is shared between threads, but the protocol keeps
// all accesses disjoint: each writer slot is driven by one thread and
// writes only into blocks it claimed; the reader only dereferences
// offsets below the acquire-loaded visible prefix, which the publishing
// writer released after completing its stores.
unsafe impl<T: Send> Send for BatchBuffer<T> {}
unsafe impl<T: Send> Sync for BatchBuffer<T> {}

impl<T: Copy> BatchBuffer<T> {
    /// Allocates a buffer of `capacity` edges with `writers` sub-buffers
    /// of `block_size` edges each. `numa_node` records the placement
    /// policy; pages land there by first touch from the pinned owner.
    ///
    /// # Panics
    /// On inconsistent sizing; the caller validates configuration first.
    pub fn new(capacity: usize, block_size: usize, writers: usize, numa_node: usize) -> Self {
        assert!(capacity > 0 && block_size > 0, "batch buffer sized zero");
        assert!(
            capacity % block_size == 0,
            "capacity {} not a multiple of block size {}",
            capacity,
            block_size
        );
        assert!(
            (1..=MAX_WRITERS).contains(&writers),
            "writer count {} outside [1, {}]",
            writers,
            MAX_WRITERS
        );
        assert!(
            writers * block_size <= capacity,
            "capacity {} cannot hold {} writer blocks of {}",
            capacity,
            writers,
            block_size
        );

        let mut storage = Vec::with_capacity(capacity);
        storage.resize_with(capacity, || UnsafeCell::new(MaybeUninit::uninit()));

        let buffer = Self {
            storage: storage.into_boxed_slice(),
            capacity,
            block_size,
            allocated: AtomicU64::new(0),
            slots: (0..writers)
                .map(|_| {
                    CachePadded::new(WriterSlot {
                        base: AtomicUsize::new(0),
                        len: AtomicUsize::new(0),
                        latest_written: AtomicU64::new(0),
                    })
                })
                .collect(),
            numa_node,
        };

        for slot in buffer.slots.iter() {
            slot.base.store(buffer.claim_block(), Ordering::Relaxed);
        }
        buffer
    }

    /// Claims a fresh block. Overflow is a fatal sizing error: the
    /// caller must `collect()` more often or raise `buffer_size`.
    fn claim_block(&self) -> usize {
        let off = self
            .allocated
            .fetch_add(self.block_size as u64, Ordering::AcqRel) as usize;
        assert!(
            off + self.block_size <= self.capacity,
            "batch buffer overflow: block at {} exceeds capacity {}",
            off,
            self.capacity
        );
        off
    }

    /// Appends `value` through writer slot `writer`.
    ///
    /// Never blocks; on the rare block-exhausted path it performs one
    /// atomic fetch-add. At most one thread may drive a given slot.
    #[inline]
    pub fn push_into(&self, value: T, writer: usize) {
        let slot = &self.slots[writer];
        let base = slot.base.load(Ordering::Relaxed);
        let len = slot.len.load(Ordering::Relaxed);

        // SAFETY: `base + len` lies inside the block this slot claimed;
        // no other thread writes it and no reader sees it until the
        // release store below (or a later collect) publishes it.
        unsafe {
            (*self.storage[base + len].get()).write(value);
        }

        let len = len + 1;
        if len == self.block_size {
            slot.latest_written
                .store((base + self.block_size) as u64, Ordering::Release);
            slot.base.store(self.claim_block(), Ordering::Relaxed);
            slot.len.store(0, Ordering::Relaxed);
        } else {
            slot.len.store(len, Ordering::Relaxed);
        }
    }

    /// Length of the published contiguous prefix: the minimum over all
    /// writers' `latest_written`. Monotone; always a multiple of the
    /// block size.
    pub fn visible_len(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.latest_written.load(Ordering::Acquire))
            .min()
            .unwrap_or(0) as usize
    }

    /// Total edges pushed so far. Exact when writers are quiescent.
    pub fn total_len(&self) -> usize {
        let claimed = self.allocated.load(Ordering::Acquire) as usize;
        let pending: usize = self.slots.iter().map(|s| s.len.load(Ordering::Acquire)).sum();
        claimed - self.slots.len() * self.block_size + pending
    }

    /// Length of the unsorted tail (writer 0's pending block, the only
    /// pending data once `collect` has run).
    pub fn tail_len(&self) -> usize {
        self.slots[0].len.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn numa_node(&self) -> usize {
        self.numa_node
    }

    fn ptr(&self) -> *const T {
        self.storage.as_ptr() as *const T
    }

    /// Immutable view of `[start, end)` of the backing array.
    ///
    /// # Safety
    /// The caller must guarantee every offset in the range is initialized
    /// (below the visible prefix, or pending-tail data with quiescent
    /// writers) and that nothing mutates it for the borrow's lifetime,
    /// i.e. it holds the partition's reader mutex or *is* the sorter.
    pub unsafe fn slice(&self, start: usize, end: usize) -> &[T] {
        debug_assert!(start <= end && end <= self.capacity);
        std::slice::from_raw_parts(self.ptr().add(start), end - start)
    }

    /// Mutable view of `[start, end)` of the backing array.
    ///
    /// # Safety
    /// As [`Self::slice`], plus exclusivity: the range must be owned by
    /// the caller under the sorting protocol (the owning sorter inside
    /// its tick, or a stealer holding the steal gate), with no other
    /// reference alive into it.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, start: usize, end: usize) -> &mut [T] {
        debug_assert!(start <= end && end <= self.capacity);
        let base = self.storage.as_ptr() as *mut T;
        std::slice::from_raw_parts_mut(base.add(start), end - start)
    }

    /// The unsorted tail: writer 0's pending edges, starting at the
    /// visible boundary after a `collect`.
    ///
    /// # Safety
    /// Writers must be quiescent (post-`collect` read phase).
    pub unsafe fn ready_tail(&self) -> &[T] {
        let slot = &self.slots[0];
        let base = slot.base.load(Ordering::Acquire);
        let len = slot.len.load(Ordering::Acquire);
        self.slice(base, base + len)
    }

    /// Quiescent-writer compaction. Collapses the partially filled
    /// writer blocks into a dense prefix by moving tail edges from the
    /// highest partial blocks into the lowest holes, republishes every
    /// writer at the new dense boundary, and re-arms the writer slots
    /// (writer 0 keeps the boundary block; the rest claim fresh ones).
    ///
    /// After this call, `visible_len() + tail_len()` equals the total
    /// number of edges ever pushed.
    ///
    /// # Safety
    /// No `push_into` may run concurrently. The partition sorter may keep
    /// reading concurrently: all moves happen at or above the old
    /// visible boundary.
    pub unsafe fn collect(&self) {
        let block = self.block_size;
        let writers = self.slots.len();
        let old_visible = self.visible_len();

        // Snapshot the per-writer partial blocks. Every other claimed
        // block was published full before its writer moved on, so the
        // unwritten tails of these blocks are the only holes.
        let parts: Vec<(usize, usize)> = self
            .slots
            .iter()
            .map(|s| (s.base.load(Ordering::Acquire), s.len.load(Ordering::Acquire)))
            .collect();

        let claimed = self.allocated.load(Ordering::SeqCst) as usize;
        let pending: usize = parts.iter().map(|p| p.1).sum();
        let total = claimed - writers * block + pending;

        // Fill the unwritten holes below the dense boundary with written
        // edges parked above it (full blocks and partial fills alike).
        // Hole capacity below `total` equals written count above it, so
        // the pairing is exact.
        let unwritten = |slot: usize| {
            parts
                .iter()
                .any(|&(base, len)| slot >= base + len && slot < base + block)
        };
        let mut dst = parts
            .iter()
            .flat_map(|&(base, len)| (base + len)..(base + block).min(total));
        for src in (total..claimed).rev() {
            if unwritten(src) {
                continue;
            }
            let d = dst
                .next()
                .expect("compaction invariant: more movable edges than holes");
            debug_assert!(d >= old_visible && src >= old_visible);
            // SAFETY: src and dst are distinct offsets at or above the
            // old visible boundary; writers are quiescent.
            let value = (*self.storage[src].get()).assume_init();
            (*self.storage[d].get()).write(value);
        }
        debug_assert!(dst.next().is_none(), "compaction left an unfilled hole");

        // Writer 0 keeps the boundary block and its sub-block remainder
        // as the ready tail; everyone republishes at the aligned
        // boundary.
        let boundary = total / block * block;
        let tail = total - boundary;

        self.allocated.store((boundary + block) as u64, Ordering::SeqCst);
        self.slots[0].base.store(boundary, Ordering::SeqCst);
        self.slots[0].len.store(tail, Ordering::SeqCst);
        self.slots[0]
            .latest_written
            .store(boundary as u64, Ordering::SeqCst);
        for slot in self.slots[1..].iter() {
            slot.base.store(self.claim_block(), Ordering::SeqCst);
            slot.len.store(0, Ordering::SeqCst);
            slot.latest_written.store(boundary as u64, Ordering::SeqCst);
        }
    }
}
