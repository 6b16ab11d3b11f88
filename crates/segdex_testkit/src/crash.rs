//! Crash recovery testing for segdex.
//!
//! An index that dies mid-operation leaves its directory in one of a few
//! recognisable states. This module recreates those states on a closed
//! index and checks that reopening and starting brings the index back in
//! line with its content store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segdex_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let harness = CrashRecoveryHarness::new(25);
//! for result in harness.run_all() {
//!     assert!(result.passed, "{:?}", result);
//! }
//! ```

use crate::content::{document_for, ContentEntry, MemoryContent};
use crate::fixtures::{test_config, TestIndex};
use segdex_core::segment::SegmentRecord;
use segdex_core::{
    DirectoryLocks, DocumentId, IndexDir, IndexResult, IndexTransaction, SegmentRegistry,
    TransactionLog, TransactionLogId, SEGMENT_DATA_FILE,
};
use segdex_storage::{FileBackend, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// States a crash can leave behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// A batch was logged but never reached a segment.
    AfterLogBeforeApply,
    /// The process died while writing a log record.
    DuringLogWrite,
    /// The process died while appending to a segment.
    DuringSegmentWrite,
    /// The old registry was deleted before the new one was renamed in.
    DuringRegistryRename,
    /// The new registry was only partly written.
    DuringRegistryWrite,
    /// A segment directory was created but never registered.
    BeforeSegmentRegistered,
    /// A full rebuild was interrupted.
    DuringRebuild,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 7] = [
        CrashPoint::AfterLogBeforeApply,
        CrashPoint::DuringLogWrite,
        CrashPoint::DuringSegmentWrite,
        CrashPoint::DuringRegistryRename,
        CrashPoint::DuringRegistryWrite,
        CrashPoint::BeforeSegmentRegistered,
        CrashPoint::DuringRebuild,
    ];
}

/// Result of a crash recovery run.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Simulated crash.
    pub point: CrashPoint,
    /// Whether the index matched its content after restart.
    pub passed: bool,
    /// Documents expected after recovery.
    pub expected_documents: usize,
    /// Documents found after recovery.
    pub actual_documents: usize,
    /// What went wrong, if anything.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    fn new(point: CrashPoint, expected: usize, actual: usize, error: Option<String>) -> Self {
        Self {
            point,
            passed: error.is_none(),
            expected_documents: expected,
            actual_documents: actual,
            error,
        }
    }
}

/// Runs crash scenarios against an index seeded from a content store.
#[derive(Debug, Clone)]
pub struct CrashRecoveryHarness {
    documents: usize,
}

impl CrashRecoveryHarness {
    /// Seeds each scenario with `documents` content entries.
    pub fn new(documents: usize) -> Self {
        Self { documents }
    }

    /// Runs every crash point.
    pub fn run_all(&self) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL.iter().map(|point| self.run(*point)).collect()
    }

    /// Builds an index, closes it, recreates `point` on disk, then restarts
    /// and compares the index with its content.
    pub fn run(&self, point: CrashPoint) -> CrashRecoveryResult {
        let index = TestIndex::with_content(MemoryContent::populated(self.documents), test_config());
        if let Err(e) = index.flush() {
            return CrashRecoveryResult::new(point, self.documents, 0, Some(e.to_string()));
        }

        let content = index.content.clone();
        let mut injected = Ok(());
        let index = index.reopen_with(|path| injected = inject(point, path, &content));
        if let Err(e) = injected {
            return CrashRecoveryResult::new(point, content.len(), 0, Some(e.to_string()));
        }

        let expected = content.len();
        let actual = index.document_count();
        let error = verify(&index, &content)
            .err()
            .or_else(|| verify_layout(point, index.path()).err());
        CrashRecoveryResult::new(point, expected, actual, error)
    }
}

/// Recreates the on-disk state of `point` in the closed index at `path`.
/// `content` is changed the way the interrupted operation would have
/// changed it.
///
/// # Errors
///
/// Returns an error if the index files cannot be read or written.
pub fn inject(point: CrashPoint, path: &Path, content: &MemoryContent) -> IndexResult<()> {
    match point {
        CrashPoint::AfterLogBeforeApply => {
            let entry = ContentEntry::new("crash-added", "late", "written before the crash");
            let mut txn = IndexTransaction::new();
            txn.add(document_for(&entry))?;
            txn.remove(DocumentId::from("doc-0"))?;
            content.put(entry);
            content.delete("doc-0");
            write_log_record(path, &txn)?;
        }
        CrashPoint::DuringLogWrite => {
            write_torn_log_record(path)?;
        }
        CrashPoint::DuringSegmentWrite => {
            tear_segment_tail(path)?;
        }
        CrashPoint::DuringRegistryRename => {
            let registry = registry_path(path)?;
            fs::rename(&registry, with_new_suffix(&registry))?;
        }
        CrashPoint::DuringRegistryWrite => {
            let registry = registry_path(path)?;
            fs::write(with_new_suffix(&registry), [0x00, 0x00, 0x00])?;
        }
        CrashPoint::BeforeSegmentRegistered => {
            let orphan = path.join("_zzz");
            fs::create_dir_all(&orphan)?;
            fs::write(orphan.join(SEGMENT_DATA_FILE), b"unregistered")?;
        }
        CrashPoint::DuringRebuild => {
            let dir = IndexDir::open(path, false)?;
            fs::write(dir.rebuild_marker_path(), b"")?;
            content.put(ContentEntry::new("crash-rebuilt", "new", "only a rebuild finds me"));
        }
    }
    Ok(())
}

fn registry_path(path: &Path) -> IndexResult<PathBuf> {
    Ok(IndexDir::open(path, false)?.registry_path())
}

fn with_new_suffix(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".new");
    PathBuf::from(name)
}

/// Writes a log record for `txn` into the closed index at `path`.
///
/// # Errors
///
/// Returns an error if the record cannot be written.
pub fn write_log_record(path: &Path, txn: &IndexTransaction) -> IndexResult<TransactionLogId> {
    let dir = IndexDir::open(path, false)?;
    let log = TransactionLog::new(dir.txlog_dir(), Arc::new(DirectoryLocks::new()), true);
    log.write(txn)
}

/// Writes a log record and cuts it in half.
///
/// # Errors
///
/// Returns an error if the record cannot be written or truncated.
pub fn write_torn_log_record(path: &Path) -> IndexResult<TransactionLogId> {
    let mut txn = IndexTransaction::new();
    txn.remove(DocumentId::from("doc-1"))?;
    let id = write_log_record(path, &txn)?;

    let dir = IndexDir::open(path, false)?;
    let name = id.to_string();
    let record_dir = dir.txlog_dir().join(&name[..2]).join(&name);
    for entry in fs::read_dir(record_dir)? {
        let file = entry?.path();
        let mut backend = FileBackend::open_existing(&file)?;
        let size = backend.size()?;
        backend.truncate(size / 2)?;
        backend.sync()?;
    }
    Ok(id)
}

/// Appends half a record to the newest registered segment.
///
/// # Errors
///
/// Returns an error if the index has no segments or the file cannot be
/// written.
pub fn tear_segment_tail(path: &Path) -> IndexResult<()> {
    let dir = IndexDir::open(path, false)?;
    let registry = SegmentRegistry::open(dir.registry_path())?;
    let Some(name) = registry.names().last() else {
        return Err(segdex_core::IndexError::index("index has no segments"));
    };

    let record = SegmentRecord::put(DocumentId::from("torn"), vec![0xAB; 64]).encode()?;
    let mut backend = FileBackend::open_existing(&dir.segment_dir(name).join(SEGMENT_DATA_FILE))?;
    backend.append(&record[..record.len() / 2])?;
    backend.sync()?;
    Ok(())
}

/// Checks that the index holds exactly the content's entries, with the
/// content's bodies.
///
/// # Errors
///
/// Returns a description of the first mismatch.
pub fn verify(index: &TestIndex, content: &MemoryContent) -> Result<(), String> {
    let reader = index.reader().map_err(|e| e.to_string())?;
    let indexed = reader.document_ids();
    let expected = content.ids();
    if indexed != expected {
        let missing: Vec<_> = expected.difference(&indexed).collect();
        let extra: Vec<_> = indexed.difference(&expected).collect();
        return Err(format!("missing {missing:?}, unexpected {extra:?}"));
    }
    for id in &expected {
        let Some(entry) = content.entry(id.as_str()) else {
            continue;
        };
        let doc = reader.document(id).map_err(|e| e.to_string())?;
        if doc.as_ref() != Some(&document_for(&entry)) {
            return Err(format!("document {id} differs from content"));
        }
    }
    Ok(())
}

fn verify_layout(point: CrashPoint, path: &Path) -> Result<(), String> {
    let txlog_clean = || -> Result<bool, String> {
        let txlog = path.join("txlog");
        let mut buckets = fs::read_dir(txlog).map_err(|e| e.to_string())?;
        Ok(buckets.next().is_none())
    };
    match point {
        CrashPoint::BeforeSegmentRegistered if path.join("_zzz").exists() => {
            Err("orphan segment directory survived".into())
        }
        CrashPoint::DuringRebuild if path.join("reindexProcessing").exists() => {
            Err("rebuild marker survived".into())
        }
        CrashPoint::DuringRegistryRename | CrashPoint::DuringRegistryWrite
            if path.join("segments.new").exists() =>
        {
            Err("registry rewrite left behind".into())
        }
        CrashPoint::DuringLogWrite if !txlog_clean()? => Err("torn log record survived".into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_recovers(point: CrashPoint) {
        let result = CrashRecoveryHarness::new(25).run(point);
        assert!(result.passed, "{result:?}");
        assert_eq!(result.expected_documents, result.actual_documents);
    }

    #[test]
    fn logged_but_unapplied_batch_is_repaired() {
        assert_recovers(CrashPoint::AfterLogBeforeApply);
    }

    #[test]
    fn torn_log_record_is_discarded() {
        assert_recovers(CrashPoint::DuringLogWrite);
    }

    #[test]
    fn torn_segment_tail_is_truncated() {
        assert_recovers(CrashPoint::DuringSegmentWrite);
    }

    #[test]
    fn interrupted_registry_rename_is_completed() {
        assert_recovers(CrashPoint::DuringRegistryRename);
    }

    #[test]
    fn partial_registry_rewrite_is_dropped() {
        assert_recovers(CrashPoint::DuringRegistryWrite);
    }

    #[test]
    fn unregistered_segment_is_removed() {
        assert_recovers(CrashPoint::BeforeSegmentRegistered);
    }

    #[test]
    fn interrupted_rebuild_runs_again() {
        assert_recovers(CrashPoint::DuringRebuild);
    }

    #[test]
    fn repair_asks_only_for_logged_ids() {
        let index = TestIndex::with_content(MemoryContent::populated(25), test_config());
        let content = index.content.clone();
        let index = index.reopen_with(|path| {
            inject(CrashPoint::AfterLogBeforeApply, path, &content).unwrap();
        });

        let expected: std::collections::BTreeSet<DocumentId> = ["crash-added", "doc-0"]
            .into_iter()
            .map(DocumentId::from)
            .collect();
        assert_eq!(index.recovery.recovered(), vec![expected]);
        assert_eq!(index.recovery.full_rebuilds(), 0);
    }
}
