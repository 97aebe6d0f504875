//! Search primitives over sorted runs.
//!
//! Runs are sorted by source vertex (possibly with a target tiebreak,
//! which these helpers ignore; the source is always the primary key).
//! Point queries binary-search inside a group-index bucket; range scans
//! that skip forward use an exponential search tuned for short hops:
//! scan a few elements, then gallop.

/// First offset in `run` whose source is `>= v`.
#[inline]
pub fn lower_bound_by_source<T>(run: &[T], v: u64, source: impl Fn(&T) -> u64) -> usize {
    run.partition_point(|e| source(e) < v)
}

/// Number of elements in `run` whose source equals `v`.
#[inline]
pub fn source_run_len<T>(run: &[T], v: u64, source: impl Fn(&T) -> u64) -> usize {
    let start = lower_bound_by_source(run, v, &source);
    let end = start + lower_bound_by_source(&run[start..], v + 1, &source);
    end - start
}

/// First offset in `run` whose source is `>= v`, assuming the answer is
/// usually close to the front. Scans the first four elements, then
/// gallops with a multiplier of 8 before binary-searching the last
/// bracket.
pub fn exponential_search_source<T>(run: &[T], v: u64, source: impl Fn(&T) -> u64) -> usize {
    if run.is_empty() || source(&run[0]) >= v {
        return 0;
    }

    const SCAN: usize = 4;
    const MULTIPLIER: usize = 8;

    if run.len() <= SCAN {
        return lower_bound_by_source(run, v, source);
    }

    for j in 1..=SCAN {
        if source(&run[j]) >= v {
            return j;
        }
    }

    let mut last = SCAN;
    let mut i = SCAN * MULTIPLIER;
    while i < run.len() && source(&run[i]) < v {
        last = i;
        i *= MULTIPLIER;
    }

    let end = i.min(run.len());
    let bracket = &run[last + 1..end];
    last + 1 + lower_bound_by_source(bracket, v, source)
}
