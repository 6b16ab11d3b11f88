//! Memory-buffered layer over the persistent store.
//!
//! Small batches of additions are parked in memory segments, which are
//! merged under a count ceiling and flushed to the persistent store once
//! the flush policy selects them or the index has been idle long enough.
//! A memory segment owns the transaction log records of the batches it
//! holds and deletes them only after its documents are durable.
//!
//! Lock order is buffer state, then store state.

use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::{IndexError, IndexResult};
use crate::manager::IndexManager;
use crate::policy::{AggregatePolicy, CountBoundedPolicy, SegmentStats, ThresholdPolicy};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::segment::{IndexReader, MemorySegment, PersistentStore};
use crate::stats::{IndexStats, StatsSnapshot};
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::{DocumentId, SegmentKey, TransactionLogId};
use crate::wal::TransactionLog;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

struct BufferState {
    segments: Vec<MemorySegment>,
    next_key: u64,
    last_flush: Instant,
    stopped: bool,
}

impl BufferState {
    fn allocate_key(&mut self) -> SegmentKey {
        let key = SegmentKey(self.next_key);
        self.next_key += 1;
        key
    }

    fn segment_stats(&self) -> Vec<SegmentStats> {
        let now = Instant::now();
        self.segments.iter().map(|s| s.stats(now)).collect()
    }

    fn ensure_present(&self, keys: &[SegmentKey]) -> IndexResult<()> {
        for key in keys {
            if !self.segments.iter().any(|s| s.key() == *key) {
                return Err(IndexError::concurrent_modification(format!(
                    "memory segment {key} disappeared during aggregation"
                )));
            }
        }
        Ok(())
    }
}

struct BufferInner {
    store: Arc<PersistentStore>,
    log: Option<Arc<TransactionLog>>,
    small_batch_threshold: usize,
    memory_policy: CountBoundedPolicy,
    flush_policy: ThresholdPolicy,
    idle_flush_after: Duration,
    stats: IndexStats,
    state: Mutex<BufferState>,
}

impl BufferInner {
    fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        let mut state = self.state.lock();
        self.stats.record_save();

        let mut rest = txn.clone();
        let mut report = ModificationReport::new();

        // Re-added ids must not linger in older memory segments.
        if !rest.added().is_empty() {
            self.evict_from_memory(&mut state, rest.added().keys())?;
        }

        // Updates and removals go to the newest segment holding the id.
        if rest.has_modifications() {
            for segment in state.segments.iter_mut().rev() {
                let claimed = segment.apply(&rest)?;
                if claimed.is_modified() {
                    rest = rest.apply(&claimed);
                    report = report.merge(claimed);
                }
                if !rest.has_modifications() {
                    break;
                }
            }
            self.dispose_empty(&mut state);
        }

        let added = rest.added().len();
        if added > 0 && added < self.small_batch_threshold {
            let ids: BTreeSet<DocumentId> = rest.added().keys().cloned().collect();
            // A re-added document must not survive in the persistent store.
            self.store.remove_documents(&ids)?;
            let key = state.allocate_key();
            state
                .segments
                .push(MemorySegment::new(key, &rest.additions_only())?);
            self.stats.record_buffered();
            debug!(segment = %key, documents = added, "batch buffered in memory");

            let claimed = ModificationReport::with_added(ids);
            rest = rest.apply(&claimed);
            report = report.merge(claimed);
        }

        if !rest.is_empty() {
            report = report.merge(self.store.apply(&rest)?);
        }

        self.aggregate(&mut state)?;

        let buffered = match txn.log_id() {
            Some(log_id) => state.segments.iter().any(|s| s.log_ids().contains(&log_id)),
            None => {
                let ids = txn.logged_added_ids();
                state
                    .segments
                    .iter()
                    .any(|s| ids.iter().any(|id| s.contains(id)))
            }
        };
        Ok(report.with_buffered(buffered))
    }

    fn evict_from_memory<'a>(
        &self,
        state: &mut BufferState,
        ids: impl IntoIterator<Item = &'a DocumentId>,
    ) -> IndexResult<()> {
        let held: Vec<DocumentId> = ids
            .into_iter()
            .filter(|id| state.segments.iter().any(|s| s.contains(id)))
            .cloned()
            .collect();
        if held.is_empty() {
            return Ok(());
        }
        let eviction = IndexTransaction::from_parts([], [], held)?;
        for segment in &mut state.segments {
            segment.apply(&eviction)?;
        }
        self.dispose_empty(state);
        Ok(())
    }

    fn dispose_empty(&self, state: &mut BufferState) {
        let (empty, live): (Vec<_>, Vec<_>) = std::mem::take(&mut state.segments)
            .into_iter()
            .partition(MemorySegment::is_empty);
        state.segments = live;
        for segment in empty {
            debug!(segment = %segment.key(), "dropping emptied memory segment");
            self.remove_logs(&state.segments, segment.log_ids());
        }
    }

    /// Deletes log records no segment in `live` still holds. One batch can
    /// be split across segments, so a record outlives all of its holders.
    fn remove_logs(&self, live: &[MemorySegment], ids: &BTreeSet<TransactionLogId>) {
        let Some(log) = &self.log else {
            return;
        };
        for id in ids {
            if live.iter().any(|s| s.log_ids().contains(id)) {
                debug!(log_id = %id, "transaction log record still held in memory");
                continue;
            }
            match log.remove(*id) {
                Ok(true) => self.stats.record_log_removed(),
                Ok(false) => {}
                Err(e) => warn!(log_id = %id, error = %e, "cannot remove transaction log record"),
            }
        }
    }

    fn aggregate(&self, state: &mut BufferState) -> IndexResult<()> {
        self.merge_memory(state)?;
        let picked = self.flush_policy.find_candidates(&state.segment_stats());
        if !picked.is_empty() {
            self.flush(state, &picked)?;
        }
        Ok(())
    }

    fn merge_memory(&self, state: &mut BufferState) -> IndexResult<()> {
        let picked = self.memory_policy.find_candidates(&state.segment_stats());
        if picked.len() < 2 {
            return Ok(());
        }
        state.ensure_present(&picked)?;

        let chosen: Vec<&MemorySegment> = state
            .segments
            .iter()
            .filter(|s| picked.contains(&s.key()))
            .collect();
        let position = state
            .segments
            .iter()
            .position(|s| picked.contains(&s.key()))
            .unwrap_or(state.segments.len());
        let key = SegmentKey(state.next_key);
        let merged = MemorySegment::merge(key, &chosen);
        state.next_key += 1;

        state.segments.retain(|s| !picked.contains(&s.key()));
        let documents = merged.document_count();
        state.segments.insert(position.min(state.segments.len()), merged);
        self.stats.record_memory_merge();
        debug!(segment = %key, merged = picked.len(), documents, "memory segments merged");
        Ok(())
    }

    fn flush(&self, state: &mut BufferState, keys: &[SegmentKey]) -> IndexResult<()> {
        state.ensure_present(keys)?;

        let chosen: Vec<&MemorySegment> = state
            .segments
            .iter()
            .filter(|s| keys.contains(&s.key()))
            .collect();
        let logs: BTreeSet<TransactionLogId> = chosen
            .iter()
            .flat_map(|s| s.log_ids().iter().copied())
            .collect();
        let docs: Vec<&Document> = chosen.iter().flat_map(|s| s.documents()).collect();
        let documents = docs.len();
        let created = self.store.add_documents(&docs)?;

        state.segments.retain(|s| !keys.contains(&s.key()));
        self.remove_logs(&state.segments, &logs);
        state.last_flush = Instant::now();
        self.stats.record_flush();
        info!(
            segments = keys.len(),
            documents,
            persistent = created.as_ref().map(|n| n.as_str()),
            "memory segments flushed"
        );
        Ok(())
    }

    fn flush_all(&self, state: &mut BufferState) -> IndexResult<()> {
        let keys: Vec<SegmentKey> = state.segments.iter().map(MemorySegment::key).collect();
        if keys.is_empty() {
            return Ok(());
        }
        self.flush(state, &keys)
    }

    fn flush_if_idle(&self) -> IndexResult<bool> {
        let mut state = self.state.lock();
        if state.stopped
            || state.segments.is_empty()
            || state.last_flush.elapsed() < self.idle_flush_after
        {
            return Ok(false);
        }
        self.merge_memory(&mut state)?;
        self.flush_all(&mut state)?;
        Ok(true)
    }
}

/// Index layer that buffers small batches in memory segments.
pub struct BufferedIndexManager {
    inner: Arc<BufferInner>,
    scheduler: Arc<Scheduler>,
    flush_check_interval: Duration,
    task: Mutex<Option<TaskHandle>>,
}

impl fmt::Debug for BufferedIndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedIndexManager")
            .field("store", &self.inner.store)
            .field("small_batch_threshold", &self.inner.small_batch_threshold)
            .field("memory_segments", &self.memory_segment_count())
            .finish_non_exhaustive()
    }
}

impl BufferedIndexManager {
    /// Creates the layer over `store`.
    ///
    /// `log` is the transaction log whose records memory segments delete
    /// after flushing; pass `None` when batches are not logged.
    pub fn new(
        store: Arc<PersistentStore>,
        log: Option<Arc<TransactionLog>>,
        config: &IndexConfig,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        let inner = BufferInner {
            store,
            log,
            small_batch_threshold: config.small_batch_threshold,
            memory_policy: config.memory_merge_policy,
            flush_policy: config.flush_policy,
            idle_flush_after: config.idle_flush_after,
            stats: IndexStats::new(),
            state: Mutex::new(BufferState {
                segments: Vec::new(),
                next_key: 0,
                last_flush: Instant::now(),
                stopped: false,
            }),
        };
        Self {
            inner: Arc::new(inner),
            scheduler,
            flush_check_interval: config.flush_check_interval,
            task: Mutex::new(None),
        }
    }

    /// Flushes every memory segment to the persistent store.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent write fails; the segments stay in
    /// memory in that case.
    pub fn flush(&self) -> IndexResult<()> {
        let mut state = self.inner.state.lock();
        self.inner.flush_all(&mut state)
    }

    /// Flushes everything if nothing was flushed for the idle period.
    /// Returns true if a flush happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the persistent write fails.
    pub fn flush_if_idle(&self) -> IndexResult<bool> {
        self.inner.flush_if_idle()
    }

    /// Number of live memory segments.
    #[must_use]
    pub fn memory_segment_count(&self) -> usize {
        self.inner.state.lock().segments.len()
    }

    /// The persistent store under this layer.
    #[must_use]
    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.inner.store
    }

    /// Counters plus the current size of each layer.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let mut snapshot = self.inner.stats.snapshot();
        {
            let state = self.inner.state.lock();
            snapshot.memory_segments = state.segments.len();
            snapshot.memory_documents = state.segments.iter().map(MemorySegment::document_count).sum();
            snapshot.memory_bytes = state.segments.iter().map(MemorySegment::byte_size).sum();
        }
        let store = &self.inner.store;
        snapshot.persistent_segments = store.segment_names().len();
        snapshot.persistent_documents = store.document_count();
        snapshot.persistent_bytes = store.size();
        snapshot.persistent_merges = store.merge_count();
        snapshot
    }
}

impl IndexManager for BufferedIndexManager {
    fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        self.inner.save(txn)
    }

    fn reader(&self) -> IndexResult<IndexReader> {
        let state = self.inner.state.lock();
        let memory: Vec<_> = state.segments.iter().map(MemorySegment::snapshot).collect();
        let persistent = self.inner.store.view();
        if persistent.is_none() && memory.is_empty() {
            return Err(IndexError::ReaderNotFound);
        }
        Ok(IndexReader::new(persistent, memory))
    }

    fn document_count(&self) -> usize {
        let state = self.inner.state.lock();
        let memory: usize = state.segments.iter().map(MemorySegment::document_count).sum();
        self.inner.store.document_count() + memory
    }

    fn directory_size(&self, include_memory: bool) -> u64 {
        let memory = if include_memory {
            let state = self.inner.state.lock();
            state.segments.iter().map(MemorySegment::byte_size).sum()
        } else {
            0
        };
        self.inner.store.size() + memory
    }

    fn document_exists(&self, id: &DocumentId) -> bool {
        let state = self.inner.state.lock();
        state.segments.iter().any(|s| s.contains(id)) || self.inner.store.contains(id)
    }

    fn field_names(&self) -> BTreeSet<String> {
        let state = self.inner.state.lock();
        let mut names = self.inner.store.field_names();
        for segment in &state.segments {
            for doc in segment.documents() {
                names.extend(doc.field_names().map(str::to_string));
            }
        }
        names
    }

    fn start(&self) -> IndexResult<()> {
        let mut task = self.task.lock();
        self.inner.state.lock().stopped = false;
        if task.is_none() {
            let weak: Weak<BufferInner> = Arc::downgrade(&self.inner);
            *task = Some(self.scheduler.schedule(self.flush_check_interval, move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = inner.flush_if_idle() {
                    inner.stats.record_background_error();
                    error!(error = %e, "background flush failed");
                }
            }));
        }
        debug!(interval = ?self.flush_check_interval, "idle flush scheduled");
        Ok(())
    }

    fn stop(&self) -> IndexResult<()> {
        let mut task = self.task.lock();
        let result = {
            let mut state = self.inner.state.lock();
            let result = self.inner.flush_all(&mut state);
            state.stopped = true;
            result
        };
        if let Some(handle) = task.take() {
            handle.cancel();
        }
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_concurrent_modification() => {
                warn!(error = %e, "segment set changed during final flush");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "final flush failed");
                Err(e)
            }
        }
    }

    fn clear(&self) -> IndexResult<()> {
        let mut state = self.inner.state.lock();
        let segments = std::mem::take(&mut state.segments);
        for segment in &segments {
            self.inner.remove_logs(&state.segments, segment.log_ids());
        }
        self.inner.store.clear()?;
        state.last_flush = Instant::now();
        info!(memory_segments = segments.len(), "index cleared");
        Ok(())
    }
}

impl Drop for BufferedIndexManager {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::IndexDir;
    use crate::lock::DirectoryLocks;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _tmp: TempDir,
        log: Arc<TransactionLog>,
        manager: BufferedIndexManager,
    }

    fn config() -> IndexConfig {
        IndexConfig::new()
            .small_batch_threshold(3)
            .max_memory_segments(10)
            .flush_policy(ThresholdPolicy::new().min_documents(1000))
            .sync_on_write(false)
    }

    fn fixture(config: IndexConfig) -> Fixture {
        let tmp = tempdir().unwrap();
        let dir = IndexDir::open(tmp.path(), true).unwrap();
        let locks = Arc::new(DirectoryLocks::new());
        let store = PersistentStore::open(
            &dir,
            Arc::clone(&locks),
            ThresholdPolicy::new().min_segments(100),
            false,
        )
        .unwrap();
        let log = Arc::new(TransactionLog::new(dir.txlog_dir(), locks, false));
        let manager = BufferedIndexManager::new(
            Arc::new(store),
            Some(Arc::clone(&log)),
            &config,
            Arc::new(Scheduler::new().unwrap()),
        );
        Fixture {
            _tmp: tmp,
            log,
            manager,
        }
    }

    fn doc(id: &str, body: &str) -> Document {
        Document::new(id).with_field("body", body)
    }

    fn adds(ids: &[&str]) -> IndexTransaction {
        IndexTransaction::from_parts(ids.iter().map(|id| doc(id, "v1")), [], []).unwrap()
    }

    fn removes(ids: &[&str]) -> IndexTransaction {
        IndexTransaction::from_parts([], [], ids.iter().map(|id| DocumentId::from(*id))).unwrap()
    }

    /// Logs the batch first, as the transactional layer does.
    fn save_logged(f: &Fixture, txn: IndexTransaction) -> (TransactionLogId, ModificationReport) {
        let id = f.log.write(&txn).unwrap();
        let report = f.manager.save(&txn.with_log(id)).unwrap();
        (id, report)
    }

    #[test]
    fn small_batch_is_buffered() {
        let f = fixture(config());
        let (log_id, report) = save_logged(&f, adds(&["a", "b"]));

        assert!(!report.is_durable());
        assert_eq!(report.added().len(), 2);
        assert_eq!(f.manager.memory_segment_count(), 1);
        assert_eq!(f.manager.store().document_count(), 0);
        assert_eq!(f.manager.document_count(), 2);
        assert!(f.log.read(log_id).unwrap().is_some());
        assert!(f.manager.reader().unwrap().contains(&DocumentId::from("a")));
    }

    #[test]
    fn large_batch_goes_straight_to_disk() {
        let f = fixture(config());
        let (_, report) = save_logged(&f, adds(&["a", "b", "c"]));

        assert!(report.is_durable());
        assert_eq!(f.manager.memory_segment_count(), 0);
        assert_eq!(f.manager.store().document_count(), 3);
    }

    #[test]
    fn removing_every_buffered_document_drops_segments_and_logs() {
        let f = fixture(config());
        let (a, _) = save_logged(&f, adds(&["A"]));
        let (b, _) = save_logged(&f, adds(&["B"]));
        let (c, _) = save_logged(&f, adds(&["C"]));
        assert_eq!(f.manager.memory_segment_count(), 3);

        let report = f.manager.save(&removes(&["A", "B", "C"])).unwrap();
        assert_eq!(report.removed().len(), 3);
        assert!(report.is_durable());
        assert_eq!(f.manager.memory_segment_count(), 0);
        for id in [a, b, c] {
            assert!(f.log.read(id).unwrap().is_none());
        }
        assert!(f.log.list().unwrap().is_empty());
    }

    #[test]
    fn count_ceiling_merges_smallest_segments() {
        let f = fixture(config().max_memory_segments(2));
        save_logged(&f, adds(&["a"]));
        save_logged(&f, adds(&["b"]));
        save_logged(&f, adds(&["c"]));

        assert_eq!(f.manager.memory_segment_count(), 2);
        assert_eq!(f.manager.document_count(), 3);
        assert_eq!(f.manager.stats().memory_merges, 1);
    }

    #[test]
    fn flush_policy_moves_segments_to_disk_and_clears_logs() {
        let f = fixture(config().flush_policy(ThresholdPolicy::new().min_documents(3)));
        save_logged(&f, adds(&["a"]));
        save_logged(&f, adds(&["b"]));
        let (_, report) = save_logged(&f, adds(&["c"]));

        assert!(report.is_durable());
        assert_eq!(f.manager.memory_segment_count(), 0);
        assert_eq!(f.manager.store().document_count(), 3);
        assert!(f.log.list().unwrap().is_empty());
    }

    #[test]
    fn flush_is_idempotent() {
        let f = fixture(config());
        save_logged(&f, adds(&["a"]));
        f.manager.flush().unwrap();
        let segments = f.manager.store().segment_names();
        f.manager.flush().unwrap();

        assert_eq!(f.manager.store().segment_names(), segments);
        assert_eq!(f.manager.document_count(), 1);
        assert_eq!(f.manager.stats().flushes, 1);
    }

    #[test]
    fn update_of_buffered_document_stays_in_memory() {
        let f = fixture(config());
        save_logged(&f, adds(&["a"]));
        let update = IndexTransaction::from_parts([], [doc("a", "v2")], []).unwrap();
        let (log_id, report) = save_logged(&f, update);

        assert!(!report.is_durable());
        assert!(report.updated().contains(&DocumentId::from("a")));
        assert!(f.log.read(log_id).unwrap().is_some());
        let body = f
            .manager
            .reader()
            .unwrap()
            .document(&DocumentId::from("a"))
            .unwrap()
            .and_then(|d| d.field("body").map(<[String]>::to_vec));
        assert_eq!(body, Some(vec!["v2".to_string()]));
    }

    #[test]
    fn re_adding_a_persistent_document_removes_the_old_copy() {
        let f = fixture(config());
        save_logged(&f, adds(&["a", "b", "c"]));
        save_logged(&f, adds(&["a"]));

        assert!(!f.manager.store().contains(&DocumentId::from("a")));
        assert_eq!(f.manager.document_count(), 3);
        assert!(f.manager.document_exists(&DocumentId::from("a")));
    }

    #[test]
    fn re_adding_a_buffered_document_keeps_one_copy() {
        let f = fixture(config());
        let (first, _) = save_logged(&f, adds(&["a"]));
        save_logged(&f, IndexTransaction::from_parts([doc("a", "v2")], [], []).unwrap());

        assert_eq!(f.manager.document_count(), 1);
        assert_eq!(f.manager.memory_segment_count(), 1);
        assert!(f.log.read(first).unwrap().is_none());

        f.manager.save(&removes(&["a"])).unwrap();
        assert!(!f.manager.document_exists(&DocumentId::from("a")));
    }

    fn mixed_batch(add: &str, update: &str) -> IndexTransaction {
        IndexTransaction::from_parts([doc(add, "v1")], [doc(update, "v2")], []).unwrap()
    }

    #[test]
    fn log_shared_by_two_segments_outlives_the_emptied_one() {
        let f = fixture(config());
        save_logged(&f, adds(&["a"]));
        let (shared, _) = save_logged(&f, mixed_batch("c", "a"));
        assert_eq!(f.manager.memory_segment_count(), 2);

        f.manager.save(&removes(&["a"])).unwrap();
        assert_eq!(f.manager.memory_segment_count(), 1);
        assert!(f.manager.document_exists(&DocumentId::from("c")));
        assert!(f.log.read(shared).unwrap().is_some());

        f.manager.flush().unwrap();
        assert!(f.log.read(shared).unwrap().is_none());
    }

    #[test]
    fn partial_flush_keeps_log_of_segment_left_in_memory() {
        let policy = ThresholdPolicy::new().min_documents(1).max_documents(1);
        let f = fixture(config().flush_policy(policy));
        save_logged(&f, adds(&["a", "b"]));
        let (shared, _) = save_logged(&f, mixed_batch("c", "a"));

        assert_eq!(f.manager.memory_segment_count(), 1);
        assert!(f.manager.store().contains(&DocumentId::from("c")));
        assert!(f.log.read(shared).unwrap().is_some());

        f.manager.flush().unwrap();
        assert!(f.log.list().unwrap().is_empty());
    }

    #[test]
    fn stop_flushes_and_is_idempotent() {
        let f = fixture(config());
        f.manager.start().unwrap();
        save_logged(&f, adds(&["a"]));

        f.manager.stop().unwrap();
        assert_eq!(f.manager.memory_segment_count(), 0);
        assert!(f.manager.store().contains(&DocumentId::from("a")));
        f.manager.stop().unwrap();
        assert_eq!(f.manager.document_count(), 1);
    }

    #[test]
    fn idle_index_is_flushed() {
        let f = fixture(config().idle_flush_after(Duration::ZERO));
        save_logged(&f, adds(&["a"]));
        assert!(f.manager.flush_if_idle().unwrap());
        assert!(!f.manager.flush_if_idle().unwrap());
        assert_eq!(f.manager.store().document_count(), 1);
    }

    #[test]
    fn background_task_flushes_idle_segments() {
        let f = fixture(
            config()
                .idle_flush_after(Duration::ZERO)
                .flush_check_interval(Duration::from_millis(10)),
        );
        f.manager.start().unwrap();
        save_logged(&f, adds(&["a"]));

        let deadline = Instant::now() + Duration::from_secs(5);
        while f.manager.memory_segment_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(f.manager.memory_segment_count(), 0);
        assert!(f.log.list().unwrap().is_empty());
    }

    #[test]
    fn clear_drops_memory_and_disk() {
        let f = fixture(config());
        save_logged(&f, adds(&["a", "b", "c"]));
        save_logged(&f, adds(&["d"]));
        f.manager.clear().unwrap();

        assert_eq!(f.manager.document_count(), 0);
        assert!(f.log.list().unwrap().is_empty());
    }

    #[test]
    fn reader_fails_without_any_layer() {
        let f = fixture(config());
        f.manager.store().close();
        assert!(matches!(f.manager.reader(), Err(IndexError::ReaderNotFound)));
    }

    #[test]
    fn field_names_cover_both_layers() {
        let f = fixture(config());
        f.manager
            .save(&IndexTransaction::from_parts(
                [
                    Document::new("x").with_field("title", "t"),
                    Document::new("y").with_field("title", "t"),
                    Document::new("z").with_field("title", "t"),
                ],
                [],
                [],
            )
            .unwrap())
            .unwrap();
        f.manager
            .save(&IndexTransaction::from_parts([Document::new("m").with_field("tag", "x")], [], []).unwrap())
            .unwrap();

        let names = f.manager.field_names();
        assert!(names.contains("title"));
        assert!(names.contains("tag"));
    }
}
