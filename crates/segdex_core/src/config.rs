//! Index configuration.

use crate::error::{IndexError, IndexResult};
use crate::policy::{CountBoundedPolicy, ThresholdPolicy};
use std::time::Duration;

/// Configuration for opening an index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Whether to create the index directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Batches adding fewer documents than this are buffered in a memory
    /// segment; larger ones go straight to the persistent store.
    pub small_batch_threshold: usize,

    /// Ceiling on live memory segments before they are merged together.
    pub memory_merge_policy: CountBoundedPolicy,

    /// When memory segments are flushed into the persistent store.
    pub flush_policy: ThresholdPolicy,

    /// When persistent segments are merged together.
    pub persistent_merge_policy: ThresholdPolicy,

    /// How often the background task checks for idle memory segments.
    pub flush_check_interval: Duration,

    /// Idle time after the last flush that forces memory segments out.
    pub idle_flush_after: Duration,

    /// Whether to fsync segment and log files on every write.
    pub sync_on_write: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            small_batch_threshold: 100,
            memory_merge_policy: CountBoundedPolicy::new(10),
            flush_policy: ThresholdPolicy::new()
                .min_documents(1000)
                .min_bytes(1024 * 1024), // 1 MB
            persistent_merge_policy: ThresholdPolicy::new()
                .min_segments(10)
                .max_bytes(64 * 1024 * 1024), // 64 MB
            flush_check_interval: Duration::from_secs(1),
            idle_flush_after: Duration::from_secs(10),
            sync_on_write: true,
        }
    }
}

impl IndexConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the index directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the small-batch threshold.
    #[must_use]
    pub const fn small_batch_threshold(mut self, documents: usize) -> Self {
        self.small_batch_threshold = documents;
        self
    }

    /// Sets the memory segment ceiling.
    #[must_use]
    pub const fn max_memory_segments(mut self, count: usize) -> Self {
        self.memory_merge_policy = CountBoundedPolicy::new(count);
        self
    }

    /// Sets the flush policy.
    #[must_use]
    pub const fn flush_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.flush_policy = policy;
        self
    }

    /// Sets the persistent merge policy.
    #[must_use]
    pub const fn persistent_merge_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.persistent_merge_policy = policy;
        self
    }

    /// Sets the background check interval.
    #[must_use]
    pub const fn flush_check_interval(mut self, interval: Duration) -> Self {
        self.flush_check_interval = interval;
        self
    }

    /// Sets the idle-flush threshold.
    #[must_use]
    pub const fn idle_flush_after(mut self, idle: Duration) -> Self {
        self.idle_flush_after = idle;
        self
    }

    /// Sets whether to fsync on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Checks that the configuration can drive an index.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Configuration`] for zero thresholds or intervals.
    pub fn validate(&self) -> IndexResult<()> {
        if self.small_batch_threshold == 0 {
            return Err(IndexError::configuration(
                "small_batch_threshold must be at least 1",
            ));
        }
        if self.memory_merge_policy.max_segments == 0 {
            return Err(IndexError::configuration(
                "max_memory_segments must be at least 1",
            ));
        }
        if self.flush_check_interval.is_zero() {
            return Err(IndexError::configuration(
                "flush_check_interval must be non-zero",
            ));
        }
        if self.persistent_merge_policy.min_segments.unwrap_or(2) < 2 {
            return Err(IndexError::configuration(
                "persistent merges need at least two segments",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = IndexConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
        assert_eq!(config.small_batch_threshold, 100);
        assert_eq!(config.idle_flush_after, Duration::from_secs(10));
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let config = IndexConfig::new()
            .small_batch_threshold(5)
            .max_memory_segments(2)
            .sync_on_write(false)
            .idle_flush_after(Duration::from_millis(50));

        assert_eq!(config.small_batch_threshold, 5);
        assert_eq!(config.memory_merge_policy.max_segments, 2);
        assert!(!config.sync_on_write);
        assert_eq!(config.idle_flush_after, Duration::from_millis(50));
    }

    #[test]
    fn zero_values_are_rejected() {
        let err = IndexConfig::new().small_batch_threshold(0).validate();
        assert!(matches!(err, Err(IndexError::Configuration { .. })));

        let err = IndexConfig::new().max_memory_segments(0).validate();
        assert!(matches!(err, Err(IndexError::Configuration { .. })));

        let err = IndexConfig::new()
            .flush_check_interval(Duration::ZERO)
            .validate();
        assert!(matches!(err, Err(IndexError::Configuration { .. })));

        let err = IndexConfig::new()
            .persistent_merge_policy(ThresholdPolicy::new().min_segments(1))
            .validate();
        assert!(matches!(err, Err(IndexError::Configuration { .. })));
    }
}
