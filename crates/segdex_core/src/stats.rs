//! Index statistics.
//!
//! Counters are atomic so they can be bumped from writer threads and the
//! background flush without taking the manager lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters of the buffered layer.
#[derive(Debug, Default)]
pub struct IndexStats {
    /// Batches saved.
    saves: AtomicU64,
    /// Batches held in a new memory segment.
    buffered_batches: AtomicU64,
    /// Memory segments merged together.
    memory_merges: AtomicU64,
    /// Flushes of memory segments into the persistent store.
    flushes: AtomicU64,
    /// Transaction log records deleted by this layer.
    logs_removed: AtomicU64,
    /// Failures of the background flush.
    background_errors: AtomicU64,
}

impl IndexStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_save(&self) {
        self.saves.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_buffered(&self) {
        self.buffered_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_memory_merge(&self) {
        self.memory_merges.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_log_removed(&self) {
        self.logs_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_background_error(&self) {
        self.background_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of saved batches.
    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Returns the number of flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Returns the number of memory merges.
    pub fn memory_merges(&self) -> u64 {
        self.memory_merges.load(Ordering::Relaxed)
    }

    /// Returns the number of background flush failures.
    pub fn background_errors(&self) -> u64 {
        self.background_errors.load(Ordering::Relaxed)
    }

    /// Copies the counters into a snapshot; gauges are left at zero for the
    /// caller to fill in.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            saves: self.saves(),
            buffered_batches: self.buffered_batches.load(Ordering::Relaxed),
            memory_merges: self.memory_merges(),
            flushes: self.flushes(),
            logs_removed: self.logs_removed.load(Ordering::Relaxed),
            background_errors: self.background_errors(),
            ..StatsSnapshot::default()
        }
    }
}

/// A point-in-time view of counters and layer sizes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Batches saved.
    pub saves: u64,
    /// Batches held in a new memory segment.
    pub buffered_batches: u64,
    /// Memory segment merges.
    pub memory_merges: u64,
    /// Memory-to-persistent flushes.
    pub flushes: u64,
    /// Transaction log records deleted after becoming durable.
    pub logs_removed: u64,
    /// Background flush failures.
    pub background_errors: u64,
    /// Live memory segments.
    pub memory_segments: usize,
    /// Documents held in memory segments.
    pub memory_documents: usize,
    /// Bytes held in memory segments.
    pub memory_bytes: u64,
    /// Registered persistent segments.
    pub persistent_segments: usize,
    /// Documents in persistent segments.
    pub persistent_documents: usize,
    /// Bytes in persistent segment files.
    pub persistent_bytes: u64,
    /// Persistent segment merges since open.
    pub persistent_merges: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = IndexStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn snapshot_reflects_recorded_events() {
        let stats = IndexStats::new();
        stats.record_save();
        stats.record_save();
        stats.record_buffered();
        stats.record_flush();
        stats.record_log_removed();

        let snap = stats.snapshot();
        assert_eq!(snap.saves, 2);
        assert_eq!(snap.buffered_batches, 1);
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.logs_removed, 1);
        assert_eq!(snap.memory_segments, 0);
    }
}
