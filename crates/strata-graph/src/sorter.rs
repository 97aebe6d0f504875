//! Sorter-thread machinery: the freeze signal, the startup latch, and
//! the per-partition sorter loop.
//!
//! Each partition owns exactly one sorter thread. Its life is a small
//! state machine:
//!
//! ```text
//! WAIT_READ_FLAG ──> HOLD_READ_LOCK ──> (sort │ steal │ 5 ms sleep)*
//!        ▲                                      │
//!        └── RELEASE_READ_LOCK <── read flag set AND visible fully sorted
//! ```
//!
//! While ingestion runs, the sorter holds its partition's reader mutex
//! and drains newly visible blocks. When the freeze flag rises and the
//! visible prefix is fully sorted, it releases the mutex (admitting the
//! readers) and parks on the flag. A stop token is observed at every
//! turn of both loops.

use crate::graph::GraphInner;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{EdgeWeight, VertexId};

/// Idle sort attempts before trying to steal from a peer.
const IDLE_BEFORE_STEAL: u32 = 2;
/// Sleep taken when a tick neither sorted nor stole.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Freeze flag plus stop token, shared by one graph's sorters.
///
/// The hot checks (`read_mode`, `stopped`) are plain atomic loads; the
/// mutex/condvar pair only serves parking and wakeup.
pub(crate) struct FreezeSignal {
    read_mode: AtomicBool,
    stopped: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl FreezeSignal {
    pub fn new() -> Self {
        Self {
            read_mode: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    pub fn set_read_mode(&self, on: bool) {
        self.read_mode.store(on, Ordering::Release);
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.cond.notify_all();
    }

    #[inline]
    pub fn read_mode(&self) -> bool {
        self.read_mode.load(Ordering::Acquire)
    }

    #[inline]
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Parks until the read flag clears or stop is requested.
    pub fn wait_until_writable(&self) {
        let mut guard = self.lock.lock();
        while self.read_mode() && !self.stopped() {
            self.cond.wait(&mut guard);
        }
    }
}

/// One-shot open latch used for the construction handshake: the graph
/// constructor returns only after every sorter has taken its partition's
/// reader mutex once, so an immediate freeze blocks correctly.
pub(crate) struct Latch {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut open = self.open.lock();
        *open = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

/// Body of one partition's sorter thread.
pub(crate) fn sorter_loop<V: VertexId, W: EdgeWeight>(
    inner: Arc<GraphInner<V, W>>,
    pid: usize,
    core: Option<usize>,
    latch: Arc<Latch>,
) {
    if inner.bind_core() {
        if let Some(core) = core {
            crate::topology::pin_current_thread(core);
        }
    }
    tracing::debug!(role = inner.role(), pid, ?core, "sorter started");

    let part = inner.partition(pid);
    let signal = inner.signal();
    let mut initialized = false;
    // Rotating peer cursor for work stealing.
    let mut steal_cursor = pid + 1;

    while !signal.stopped() {
        signal.wait_until_writable();
        if signal.stopped() {
            break;
        }

        let mut state = part.state().lock();
        if !initialized {
            latch.open();
            initialized = true;
        }

        // Inner loop keeps the reader mutex held between ticks.
        let mut idle = 0u32;
        loop {
            if signal.stopped() {
                break;
            }
            if signal.read_mode() && part.visible_sorted(&state) {
                break;
            }

            if part.sort_tick(&mut state) {
                idle = 0;
                continue;
            }
            idle += 1;

            let mut stole = false;
            if idle >= IDLE_BEFORE_STEAL {
                stole = inner.steal_round(pid, &mut steal_cursor);
            }
            if !stole {
                inner.note_sleep(IDLE_SLEEP.as_millis() as u64);
                std::thread::sleep(IDLE_SLEEP);
            }
        }
        drop(state);
        tracing::trace!(role = inner.role(), pid, "sorter released reader mutex");
    }
    tracing::debug!(role = inner.role(), pid, "sorter stopped");
}
