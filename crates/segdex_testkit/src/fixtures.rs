//! Test fixtures and index helpers.
//!
//! Provides temporary indexes wired to an in-memory content store, plus
//! batch builders for common scenarios.

use crate::content::{ContentEntry, ContentRecovery, MemoryContent, RecordingRecovery};
use segdex_core::{
    Document, DocumentId, IndexConfig, IndexTransaction, RecoveryService, SearchIndex,
    ThresholdPolicy,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test log subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Configuration suited to tests: no fsync, small batches buffered, no
/// automatic flush.
pub fn test_config() -> IndexConfig {
    IndexConfig::default()
        .small_batch_threshold(10)
        .max_memory_segments(4)
        .flush_policy(ThresholdPolicy::new().min_documents(1_000))
        .persistent_merge_policy(ThresholdPolicy::new().min_segments(8))
        .idle_flush_after(Duration::from_secs(3_600))
        .sync_on_write(false)
}

/// A started index in a temporary directory, with its content store.
pub struct TestIndex {
    /// The index.
    pub index: SearchIndex,
    /// Content the index is recovered from.
    pub content: MemoryContent,
    /// Records repair and rebuild requests.
    pub recovery: Arc<RecordingRecovery<ContentRecovery>>,
    config: IndexConfig,
    // Declared last so the index closes before the directory is deleted.
    temp_dir: TempDir,
}

impl TestIndex {
    /// Creates a started index over an empty content store.
    pub fn new() -> Self {
        Self::with_content(MemoryContent::new(), test_config())
    }

    /// Creates a started index over `content`, built by a full rebuild.
    pub fn with_content(content: MemoryContent, config: IndexConfig) -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let recovery = Arc::new(RecordingRecovery::for_content(content.clone()));
        let index = open_index(temp_dir.path(), &recovery, &config);
        index.start().expect("Failed to start index");
        Self {
            index,
            content,
            recovery,
            config,
            temp_dir,
        }
    }

    /// Index directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Index directory as an owned path.
    pub fn path_buf(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Closes the index, runs `between` on the closed directory, then
    /// reopens and starts it again.
    pub fn reopen_with(self, between: impl FnOnce(&Path)) -> Self {
        let Self {
            index,
            content,
            recovery,
            config,
            temp_dir,
        } = self;
        drop(index);
        between(temp_dir.path());

        recovery.reset();
        let index = open_index(temp_dir.path(), &recovery, &config);
        index.start().expect("Failed to restart index");
        Self {
            index,
            content,
            recovery,
            config,
            temp_dir,
        }
    }

    /// Closes and reopens the index.
    pub fn reopen(self) -> Self {
        self.reopen_with(|_| {})
    }

    /// Saves `entry` to the content store and indexes it.
    pub fn put(&self, entry: ContentEntry) {
        let mut txn = IndexTransaction::new();
        let doc = crate::content::document_for(&entry);
        if self.index.document_exists(doc.id()) {
            txn.update(doc).expect("Failed to build update");
        } else {
            txn.add(doc).expect("Failed to build add");
        }
        self.content.put(entry);
        self.index.save(&txn).expect("Failed to save batch");
    }

    /// Deletes `id` from the content store and the index.
    pub fn delete(&self, id: &str) {
        self.content.delete(id);
        self.index
            .save(&remove_batch(&[id]))
            .expect("Failed to save removal");
    }

    /// Ids visible through a fresh reader.
    pub fn visible_ids(&self) -> Vec<String> {
        self.index
            .reader()
            .expect("Failed to open reader")
            .document_ids()
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }
}

impl Default for TestIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestIndex {
    type Target = SearchIndex;

    fn deref(&self) -> &Self::Target {
        &self.index
    }
}

fn open_index(
    path: &Path,
    recovery: &Arc<RecordingRecovery<ContentRecovery>>,
    config: &IndexConfig,
) -> SearchIndex {
    SearchIndex::builder(path, Arc::clone(recovery) as Arc<dyn RecoveryService>)
        .config(config.clone())
        .open()
        .expect("Failed to open index")
}

/// Runs a test with a started temporary index.
///
/// # Example
///
/// ```rust,ignore
/// use segdex_testkit::with_temp_index;
///
/// #[test]
/// fn my_test() {
///     with_temp_index(|index| {
///         index.save(&add_batch(&["a", "b"])).unwrap();
///     });
/// }
/// ```
pub fn with_temp_index<F, R>(f: F) -> R
where
    F: FnOnce(&SearchIndex) -> R,
{
    let test_index = TestIndex::new();
    f(&test_index.index)
}

/// A document with a `body` field.
pub fn test_document(id: &str, body: &str) -> Document {
    Document::new(id).with_field("body", body)
}

/// A batch adding one document per id.
pub fn add_batch(ids: &[&str]) -> IndexTransaction {
    IndexTransaction::from_parts(
        ids.iter().map(|id| test_document(id, &format!("body of {id}"))),
        std::iter::empty(),
        std::iter::empty(),
    )
    .expect("Failed to build add batch")
}

/// A batch replacing the body of each id.
pub fn update_batch(ids: &[&str], body: &str) -> IndexTransaction {
    IndexTransaction::from_parts(
        std::iter::empty(),
        ids.iter().map(|id| test_document(id, body)),
        std::iter::empty(),
    )
    .expect("Failed to build update batch")
}

/// A batch removing each id.
pub fn remove_batch(ids: &[&str]) -> IndexTransaction {
    IndexTransaction::from_parts(
        std::iter::empty(),
        std::iter::empty(),
        ids.iter().map(|id| DocumentId::from(*id)),
    )
    .expect("Failed to build remove batch")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_starts_empty() {
        let index = TestIndex::new();
        assert_eq!(index.document_count(), 0);
        assert!(index.is_started());
        assert_eq!(index.recovery.full_rebuilds(), 1);
    }

    #[test]
    fn content_is_indexed_on_first_start() {
        let index = TestIndex::with_content(MemoryContent::populated(5), test_config());
        assert_eq!(index.document_count(), 5);
        assert_eq!(index.visible_ids().len(), 5);
    }

    #[test]
    fn reopen_keeps_documents() {
        let index = TestIndex::new();
        index.put(ContentEntry::new("a", "t", "b"));
        let index = index.reopen();
        assert!(index.document_exists(&DocumentId::from("a")));
        assert_eq!(index.recovery.full_rebuilds(), 0);
    }

    #[test]
    fn with_temp_index_runs_closure() {
        let count = with_temp_index(|index| {
            index.save(&add_batch(&["x", "y"])).unwrap();
            index.document_count()
        });
        assert_eq!(count, 2);
    }
}
