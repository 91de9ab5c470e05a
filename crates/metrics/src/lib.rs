//! Process-wide query counters.
//!
//! Three monotonic counters track how much work the pruning layers actually
//! save: total Bloom-filter probes, probes against leaf filters only, and
//! SSTable scan invocations. Worker tasks bump them from many threads;
//! callers sample a [`snapshot`] before and after a query and subtract.
//!
//! Updates are `Relaxed` atomics — the only requirement is that a snapshot
//! taken after all worker tasks have joined sees their increments, which the
//! join itself guarantees.

use std::ops::Sub;
use std::sync::atomic::{AtomicU64, Ordering};

static BLOOM_PROBES: AtomicU64 = AtomicU64::new(0);
static LEAF_BLOOM_PROBES: AtomicU64 = AtomicU64::new(0);
static SST_SCANS: AtomicU64 = AtomicU64::new(0);

/// Records one Bloom-filter probe; `leaf` marks probes against leaf nodes.
#[inline]
pub fn record_bloom_probe(leaf: bool) {
    BLOOM_PROBES.fetch_add(1, Ordering::Relaxed);
    if leaf {
        LEAF_BLOOM_PROBES.fetch_add(1, Ordering::Relaxed);
    }
}

/// Records `n` SSTable scan invocations.
#[inline]
pub fn record_sst_scans(n: u64) {
    SST_SCANS.fetch_add(n, Ordering::Relaxed);
}

/// A point-in-time reading of all three counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub bloom_probes: u64,
    pub leaf_bloom_probes: u64,
    pub sst_scans: u64,
}

impl Snapshot {
    /// Probes against internal (non-leaf) filters.
    #[must_use]
    pub fn non_leaf_bloom_probes(&self) -> u64 {
        self.bloom_probes.saturating_sub(self.leaf_bloom_probes)
    }
}

impl Sub for Snapshot {
    type Output = Snapshot;

    /// Delta between two snapshots (`after - before`).
    fn sub(self, before: Snapshot) -> Snapshot {
        Snapshot {
            bloom_probes: self.bloom_probes.saturating_sub(before.bloom_probes),
            leaf_bloom_probes: self
                .leaf_bloom_probes
                .saturating_sub(before.leaf_bloom_probes),
            sst_scans: self.sst_scans.saturating_sub(before.sst_scans),
        }
    }
}

/// Reads all three counters.
#[must_use]
pub fn snapshot() -> Snapshot {
    Snapshot {
        bloom_probes: BLOOM_PROBES.load(Ordering::Relaxed),
        leaf_bloom_probes: LEAF_BLOOM_PROBES.load(Ordering::Relaxed),
        sst_scans: SST_SCANS.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are process-global, so tests assert on deltas only; other
    // tests running in parallel can only make deltas larger.

    #[test]
    fn probes_accumulate() {
        let before = snapshot();
        record_bloom_probe(false);
        record_bloom_probe(true);
        let delta = snapshot() - before;
        assert!(delta.bloom_probes >= 2);
        assert!(delta.leaf_bloom_probes >= 1);
    }

    #[test]
    fn sst_scans_accumulate() {
        let before = snapshot();
        record_sst_scans(3);
        let delta = snapshot() - before;
        assert!(delta.sst_scans >= 3);
    }

    #[test]
    fn non_leaf_probe_count() {
        let s = Snapshot {
            bloom_probes: 10,
            leaf_bloom_probes: 4,
            sst_scans: 0,
        };
        assert_eq!(s.non_leaf_bloom_probes(), 6);
    }
}
