//! Aggregation policies.
//!
//! A policy looks at a snapshot of live segments and picks the ones that
//! should be merged together (memory segments into a bigger memory segment,
//! memory segments into a persistent segment, or persistent segments into
//! one). Policies are pure: they never touch their input, and identical
//! snapshots always yield identical candidate sets.
//!
//! ## Invariants
//!
//! - Candidates are returned in input order
//! - A candidate set is either empty or names at least one segment
//! - Nothing outside the snapshot is consulted (no clocks, no I/O)

use crate::types::SegmentKey;
use std::time::Duration;

/// Snapshot of one live segment as seen by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    /// Segment identity.
    pub key: SegmentKey,
    /// Number of live documents.
    pub document_count: usize,
    /// Size in bytes.
    pub byte_size: u64,
    /// Time since the segment was last modified.
    pub idle: Duration,
}

/// Decides which segments to aggregate.
pub trait AggregatePolicy: Send + Sync + std::fmt::Debug {
    /// Returns the keys of the segments to merge, in input order.
    fn find_candidates(&self, segments: &[SegmentStats]) -> Vec<SegmentKey>;
}

/// Keeps the number of live segments bounded.
///
/// Once more than `max_segments` segments are live, the smallest ones
/// (oldest first on ties) are selected so that merging them into one brings
/// the count back to `max_segments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountBoundedPolicy {
    /// Highest number of segments tolerated without merging.
    pub max_segments: usize,
}

impl CountBoundedPolicy {
    /// Creates the policy.
    #[must_use]
    pub const fn new(max_segments: usize) -> Self {
        Self { max_segments }
    }
}

impl Default for CountBoundedPolicy {
    fn default() -> Self {
        Self::new(10)
    }
}

impl AggregatePolicy for CountBoundedPolicy {
    fn find_candidates(&self, segments: &[SegmentStats]) -> Vec<SegmentKey> {
        if segments.len() <= self.max_segments {
            return Vec::new();
        }
        let take = segments.len() - self.max_segments + 1;

        // Input order is age order, so the position breaks size ties.
        let mut by_size: Vec<(usize, &SegmentStats)> = segments.iter().enumerate().collect();
        by_size.sort_by_key(|(pos, s)| (s.byte_size, *pos));

        let mut chosen: Vec<usize> = by_size.into_iter().take(take).map(|(pos, _)| pos).collect();
        if chosen.len() < 2 {
            return Vec::new();
        }
        chosen.sort_unstable();
        chosen.into_iter().map(|pos| segments[pos].key).collect()
    }
}

/// Size, document-count and idle-time gated aggregation.
///
/// Segments above `max_bytes` or `max_documents` are never selected. The
/// remaining eligible set is returned only when every configured minimum
/// holds for it:
///
/// - at least `min_segments` eligible segments
/// - at least `min_bytes` in total
/// - at least `min_documents` in total
/// - every eligible segment idle for at least `min_idle`
///
/// A minimum left as `None` does not gate. With no minimum configured the
/// whole eligible set is returned whenever it is non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThresholdPolicy {
    /// Minimum number of eligible segments.
    pub min_segments: Option<usize>,
    /// Minimum total size in bytes.
    pub min_bytes: Option<u64>,
    /// Largest segment size still eligible.
    pub max_bytes: Option<u64>,
    /// Minimum total document count.
    pub min_documents: Option<usize>,
    /// Largest per-segment document count still eligible.
    pub max_documents: Option<usize>,
    /// Minimum time every eligible segment must have been left unmodified.
    pub min_idle: Option<Duration>,
}

impl ThresholdPolicy {
    /// Creates a policy with nothing configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the minimum segment count.
    #[must_use]
    pub const fn min_segments(mut self, count: usize) -> Self {
        self.min_segments = Some(count);
        self
    }

    /// Sets the minimum total size.
    #[must_use]
    pub const fn min_bytes(mut self, bytes: u64) -> Self {
        self.min_bytes = Some(bytes);
        self
    }

    /// Sets the maximum eligible segment size.
    #[must_use]
    pub const fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    /// Sets the minimum total document count.
    #[must_use]
    pub const fn min_documents(mut self, count: usize) -> Self {
        self.min_documents = Some(count);
        self
    }

    /// Sets the maximum eligible per-segment document count.
    #[must_use]
    pub const fn max_documents(mut self, count: usize) -> Self {
        self.max_documents = Some(count);
        self
    }

    /// Sets the minimum idle time.
    #[must_use]
    pub const fn min_idle(mut self, idle: Duration) -> Self {
        self.min_idle = Some(idle);
        self
    }

    fn is_eligible(&self, s: &SegmentStats) -> bool {
        self.max_bytes.map_or(true, |max| s.byte_size <= max)
            && self.max_documents.map_or(true, |max| s.document_count <= max)
    }
}

impl AggregatePolicy for ThresholdPolicy {
    fn find_candidates(&self, segments: &[SegmentStats]) -> Vec<SegmentKey> {
        let eligible: Vec<&SegmentStats> = segments.iter().filter(|s| self.is_eligible(s)).collect();
        if eligible.is_empty() {
            return Vec::new();
        }

        let total_bytes: u64 = eligible.iter().map(|s| s.byte_size).sum();
        let total_docs: usize = eligible.iter().map(|s| s.document_count).sum();
        let least_idle = eligible.iter().map(|s| s.idle).min().unwrap_or_default();

        let satisfied = self.min_segments.map_or(true, |min| eligible.len() >= min)
            && self.min_bytes.map_or(true, |min| total_bytes >= min)
            && self.min_documents.map_or(true, |min| total_docs >= min)
            && self.min_idle.map_or(true, |min| least_idle >= min);

        if satisfied {
            eligible.into_iter().map(|s| s.key).collect()
        } else {
            Vec::new()
        }
    }
}
