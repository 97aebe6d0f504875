//! Run-boundary bookkeeping for one partition.
//!
//! The sorted prefix of a partition's batch is a sequence of
//! non-overlapping sorted runs. `MergeableRuns` stores just the
//! boundaries, as a strictly increasing offset list `[s_0, .., s_k]`
//! where run `i` is `[s_i, s_{i+1})`. Two mutations exist: appending a
//! new run at the right, and collapsing the trailing `k` runs into one
//! after a tiered merge.

use smallvec::SmallVec;

/// Maximum number of runs a partition may hold at once.
pub const MAX_RUNS: usize = 64;

#[derive(Debug, Clone)]
pub struct MergeableRuns {
    /// `[0, 3, 9]` describes two runs, `[0, 3)` and `[3, 9)`.
    /// Holds at most `MAX_RUNS + 1` offsets; the one past the inline
    /// capacity spills, which only happens at the run-count ceiling.
    starts: SmallVec<[usize; MAX_RUNS]>,
}

impl MergeableRuns {
    pub fn new() -> Self {
        let mut starts = SmallVec::new();
        starts.push(0);
        Self { starts }
    }

    /// Number of runs.
    pub fn len(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The run at `idx`, oldest first.
    pub fn get(&self, idx: usize) -> (usize, usize) {
        (self.starts[idx], self.starts[idx + 1])
    }

    pub fn back(&self) -> (usize, usize) {
        self.get(self.len() - 1)
    }

    /// End offset of the newest run; 0 when no runs exist.
    pub fn sorted_end(&self) -> usize {
        *self.starts.last().unwrap()
    }

    /// Appends a run `[sorted_end, range_end)` at the right.
    pub fn append(&mut self, range_end: usize) {
        debug_assert!(
            range_end > self.sorted_end(),
            "run offsets must strictly increase: {} -> {}",
            self.sorted_end(),
            range_end
        );
        assert!(self.len() < MAX_RUNS, "run count exceeds {}", MAX_RUNS);
        self.starts.push(range_end);
    }

    /// Collapses the trailing `count` runs into a single run.
    pub fn merge_last(&mut self, count: usize) {
        debug_assert!(count >= 1 && count <= self.len());
        let end = self.sorted_end();
        self.starts.truncate(self.starts.len() - count + 1);
        *self.starts.last_mut().unwrap() = end;
    }

    /// Runs in index-space order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.starts.windows(2).map(|w| (w[0], w[1]))
    }
}

impl Default for MergeableRuns {
    fn default() -> Self {
        Self::new()
    }
}
