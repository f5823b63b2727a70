//! Run statistics tracking.
//!
//! Accumulates per-kind counters and capability gaps while a pass runs.
//! Shared by the concurrent behavior-definition reconciliations.

use hearth_db::{CapabilityGap, KindCounts, RecordKind, RunStatistics};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Instant;

/// Thread-safe tracker for accumulating statistics during a run.
pub struct StatisticsTracker {
    /// Resources returned by the listing.
    resources_found: AtomicU32,
    /// Counters per kind.
    kinds: RwLock<RunStatistics>,
    /// Capabilities missing this pass.
    gaps: RwLock<BTreeSet<CapabilityGap>>,
    /// Start time for duration calculation.
    start_time: Instant,
}

impl StatisticsTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources_found: AtomicU32::new(0),
            kinds: RwLock::new(RunStatistics::new()),
            gaps: RwLock::new(BTreeSet::new()),
            start_time: Instant::now(),
        }
    }

    /// Set the number of resources returned by the listing.
    pub fn set_resources_found(&self, count: usize) {
        self.resources_found
            .store(saturate(count), Ordering::SeqCst);
    }

    /// Get the number of resources returned by the listing.
    pub fn resources_found(&self) -> u32 {
        self.resources_found.load(Ordering::SeqCst)
    }

    fn update(&self, kind: RecordKind, f: impl FnOnce(&mut KindCounts)) {
        if let Ok(mut stats) = self.kinds.write() {
            f(stats.kind_mut(kind));
        }
    }

    /// Record how many records of `kind` the remote side reported.
    pub fn record_found(&self, kind: RecordKind, count: usize) {
        self.update(kind, |c| c.found += saturate(count));
    }

    /// Record the outcome of a batch write.
    pub fn record_written(&self, kind: RecordKind, created: u32, updated: u32, unchanged: u32) {
        self.update(kind, |c| {
            c.added += created;
            c.updated += updated;
            c.unchanged += unchanged;
        });
    }

    /// Record records left alone because the stored copy was current.
    pub fn record_skipped(&self, kind: RecordKind, count: usize) {
        self.update(kind, |c| c.skipped += saturate(count));
    }

    /// Record deleted records.
    pub fn record_removed(&self, kind: RecordKind, count: u64) {
        self.update(kind, |c| {
            c.removed += u32::try_from(count).unwrap_or(u32::MAX);
        });
    }

    /// Record failed configuration fetches.
    pub fn record_enrichment_failed(&self, kind: RecordKind, count: usize) {
        self.update(kind, |c| c.enrichment_failed += saturate(count));
    }

    /// Record a capability the remote side did not provide.
    pub fn record_gap(&self, gap: CapabilityGap) {
        if let Ok(mut gaps) = self.gaps.write() {
            gaps.insert(gap);
        }
    }

    /// Current counters for one kind.
    pub fn kind(&self, kind: RecordKind) -> KindCounts {
        self.kinds
            .read()
            .map(|stats| *stats.kind(kind))
            .unwrap_or_default()
    }

    /// Get elapsed duration in milliseconds.
    pub fn elapsed_millis(&self) -> u64 {
        u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Snapshot current statistics and gaps.
    pub fn snapshot(&self) -> (RunStatistics, BTreeSet<CapabilityGap>) {
        let mut stats = self
            .kinds
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        stats.resources_found = self.resources_found();

        let gaps = self
            .gaps
            .read()
            .map(|gaps| gaps.clone())
            .unwrap_or_default();

        (stats, gaps)
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}
