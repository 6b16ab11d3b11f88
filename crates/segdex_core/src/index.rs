//! Index facade.

use crate::config::IndexConfig;
use crate::dir::IndexDir;
use crate::error::{IndexError, IndexResult};
use crate::lock::DirectoryLocks;
use crate::manager::{
    BufferedIndexManager, IndexManager, StartableIndexManager, TransactionalIndexManager,
};
use crate::recovery::RecoveryService;
use crate::scheduler::Scheduler;
use crate::segment::{IndexReader, PersistentStore};
use crate::stats::StatsSnapshot;
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::DocumentId;
use crate::wal::TransactionLog;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Assembles a [`SearchIndex`].
///
/// # Example
///
/// ```rust,ignore
/// use segdex_core::{IndexBuilder, IndexConfig};
///
/// let index = IndexBuilder::new("data/index", recovery)
///     .config(IndexConfig::default().small_batch_threshold(50))
///     .open()?;
/// index.start()?;
/// ```
pub struct IndexBuilder {
    path: PathBuf,
    config: IndexConfig,
    recovery: Arc<dyn RecoveryService>,
    scheduler: Option<Arc<Scheduler>>,
    locks: Option<Arc<DirectoryLocks>>,
    log: bool,
}

impl fmt::Debug for IndexBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexBuilder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl IndexBuilder {
    /// Starts a builder for the index at `path`, repaired from `recovery`.
    pub fn new(path: impl Into<PathBuf>, recovery: Arc<dyn RecoveryService>) -> Self {
        Self {
            path: path.into(),
            config: IndexConfig::default(),
            recovery,
            scheduler: None,
            locks: None,
            log: true,
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a timer thread with other indexes.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Shares a directory lock service with other indexes on the same store.
    #[must_use]
    pub fn locks(mut self, locks: Arc<DirectoryLocks>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Skips the transaction log layer. Batches buffered in memory are lost
    /// on a crash.
    #[must_use]
    pub fn without_log(mut self) -> Self {
        self.log = false;
        self
    }

    /// Opens the index. It accepts batches right away but applies them only
    /// once [`SearchIndex::start`] is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory is
    /// locked or missing, or the persistent store cannot be loaded.
    pub fn open(self) -> IndexResult<SearchIndex> {
        self.config.validate()?;
        let dir = IndexDir::open(&self.path, self.config.create_if_missing)?;
        let locks = self.locks.unwrap_or_default();
        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Arc::new(Scheduler::new()?),
        };

        let store = Arc::new(PersistentStore::open(
            &dir,
            Arc::clone(&locks),
            self.config.persistent_merge_policy,
            self.config.sync_on_write,
        )?);
        let log = self.log.then(|| {
            Arc::new(TransactionLog::new(
                dir.txlog_dir(),
                Arc::clone(&locks),
                self.config.sync_on_write,
            ))
        });
        let buffered = Arc::new(BufferedIndexManager::new(
            Arc::clone(&store),
            log.clone(),
            &self.config,
            Arc::clone(&scheduler),
        ));

        let middle: Arc<dyn IndexManager> = match log {
            Some(log) => Arc::new(TransactionalIndexManager::new(
                Arc::clone(&buffered) as Arc<dyn IndexManager>,
                log,
                Arc::clone(&self.recovery),
            )),
            None => Arc::clone(&buffered) as Arc<dyn IndexManager>,
        };
        let top = StartableIndexManager::new(middle, self.recovery, dir.rebuild_marker_path());

        info!(
            path = %dir.path().display(),
            logged = self.log,
            "index opened"
        );
        Ok(SearchIndex {
            top,
            buffered,
            store,
            open: Mutex::new(true),
            config: self.config,
            _scheduler: scheduler,
            dir,
        })
    }
}

/// A search index: memory buffering, transaction log and persistent
/// segments behind one handle.
///
/// Dropping the index stops it, flushing memory segments to disk.
pub struct SearchIndex {
    top: StartableIndexManager,
    buffered: Arc<BufferedIndexManager>,
    store: Arc<PersistentStore>,
    open: Mutex<bool>,
    config: IndexConfig,
    _scheduler: Arc<Scheduler>,
    // Dropped last: holds the process lock.
    dir: IndexDir,
}

impl fmt::Debug for SearchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchIndex")
            .field("path", &self.dir.path())
            .field("open", &*self.open.lock())
            .finish_non_exhaustive()
    }
}

impl SearchIndex {
    /// Opens the index at `path` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`IndexBuilder::open`].
    pub fn open(path: impl Into<PathBuf>, recovery: Arc<dyn RecoveryService>) -> IndexResult<Self> {
        IndexBuilder::new(path, recovery).open()
    }

    /// Returns a builder for the index at `path`.
    pub fn builder(path: impl Into<PathBuf>, recovery: Arc<dyn RecoveryService>) -> IndexBuilder {
        IndexBuilder::new(path, recovery)
    }

    fn ensure_open(&self) -> IndexResult<()> {
        if *self.open.lock() {
            Ok(())
        } else {
            Err(IndexError::IndexClosed)
        }
    }

    /// Repairs the index and starts applying batches.
    ///
    /// Leftover transaction log records are repaired first; an empty index
    /// or an interrupted rebuild triggers a full rebuild; otherwise batches
    /// saved before start are applied in order.
    ///
    /// # Errors
    ///
    /// Returns an error if recovery fails. The index stays unstarted.
    pub fn start(&self) -> IndexResult<()> {
        self.ensure_open()?;
        self.top.start()
    }

    /// Returns true once [`start`](Self::start) has succeeded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.top.is_started()
    }

    /// Applies a batch.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Transaction`] if the batch could not be applied;
    /// its log record is repaired on next start.
    pub fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        self.ensure_open()?;
        self.top.save(txn)
    }

    /// Returns a point-in-time reader over memory and disk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ReaderNotFound`] once the index is closed.
    pub fn reader(&self) -> IndexResult<IndexReader> {
        self.top.reader()
    }

    /// Number of live documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.top.document_count()
    }

    /// Bytes on disk, plus memory segments if `include_memory`.
    #[must_use]
    pub fn directory_size(&self, include_memory: bool) -> u64 {
        self.top.directory_size(include_memory)
    }

    /// Returns true if `id` is live.
    #[must_use]
    pub fn document_exists(&self, id: &DocumentId) -> bool {
        self.top.document_exists(id)
    }

    /// Field names of live documents.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<String> {
        self.top.field_names()
    }

    /// Flushes memory segments to disk without stopping.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent write fails.
    pub fn flush(&self) -> IndexResult<()> {
        self.ensure_open()?;
        self.buffered.flush()
    }

    /// Runs the persistent merge policy once.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails.
    pub fn merge(&self) -> IndexResult<usize> {
        self.ensure_open()?;
        self.store.merge()
    }

    /// Flushes memory segments and stops background work.
    ///
    /// # Errors
    ///
    /// Returns the final flush error, if any.
    pub fn stop(&self) -> IndexResult<()> {
        self.top.stop()
    }

    /// Drops every document; the index keeps running.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be rewritten.
    pub fn clear(&self) -> IndexResult<()> {
        self.ensure_open()?;
        self.top.clear()
    }

    /// Counters and layer sizes.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.buffered.stats()
    }

    /// Index directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Configuration the index was opened with.
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Stops the index and closes the persistent store.
    ///
    /// # Errors
    ///
    /// Returns the final flush error; the store is closed regardless.
    pub fn close(&self) -> IndexResult<()> {
        let mut open = self.open.lock();
        if !*open {
            return Ok(());
        }
        let stopped = self.top.stop();
        self.store.close();
        *open = false;
        info!(path = %self.dir.path().display(), "index closed");
        stopped
    }
}

impl Drop for SearchIndex {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "index did not close cleanly");
        }
    }
}
