//! Transaction log service.

use crate::error::{IndexError, IndexResult};
use crate::lock::DirectoryLocks;
use crate::transaction::IndexTransaction;
use crate::types::TransactionLogId;
use crate::wal::record::LogRecord;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const RECORD_FILE: &str = "record.wal";

/// Writes, lists and removes per-batch log records.
///
/// Each record lives in its own directory, `txlog/<ab>/<uuid>/record.wal`,
/// where `ab` is the first two hex digits of the id. A record exists from
/// before the batch touches any segment until the batch is durable.
#[derive(Debug)]
pub struct TransactionLog {
    dir: PathBuf,
    locks: Arc<DirectoryLocks>,
    sync: bool,
}

impl TransactionLog {
    /// Creates a log rooted at `dir`, which must exist.
    pub fn new(dir: impl Into<PathBuf>, locks: Arc<DirectoryLocks>, sync: bool) -> Self {
        Self {
            dir: dir.into(),
            locks,
            sync,
        }
    }

    /// Root directory of the log.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_dir(&self, id: TransactionLogId) -> PathBuf {
        let name = id.to_string();
        self.dir.join(&name[..2]).join(name)
    }

    /// Writes a record for `txn` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::TransactionLog`] if the record cannot be
    /// created or written.
    pub fn write(&self, txn: &IndexTransaction) -> IndexResult<TransactionLogId> {
        let record = LogRecord {
            id: TransactionLogId::generate(),
            added: txn.logged_added_ids(),
            removed: txn.removed().clone(),
        };
        let bytes = record.encode()?;

        let record_dir = self.record_dir(record.id);
        let mut file = self.locks.create_file(&record_dir, RECORD_FILE, 2)?;
        let written = file
            .write_all(&bytes)
            .and_then(|()| if self.sync { file.sync_all() } else { Ok(()) });
        if let Err(e) = written {
            return Err(IndexError::transaction_log(format!(
                "cannot write log record {}: {e}",
                record.id
            )));
        }

        debug!(log_id = %record.id, added = record.added.len(), removed = record.removed.len(), "log record written");
        Ok(record.id)
    }

    /// Removes a record, returning whether it was deleted now.
    ///
    /// Removing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the record directory could not be deleted.
    pub fn remove(&self, id: TransactionLogId) -> IndexResult<bool> {
        let removed = self.locks.remove_directory(&self.record_dir(id), 1)?;
        if removed {
            debug!(log_id = %id, "log record removed");
        }
        Ok(removed)
    }

    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Fails like [`list`](Self::list) for a corrupt record.
    pub fn read(&self, id: TransactionLogId) -> IndexResult<Option<LogRecord>> {
        match fs::read(self.record_dir(id).join(RECORD_FILE)) {
            Ok(bytes) => LogRecord::decode(&bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists every complete record, ordered by id.
    ///
    /// Records cut short by a crash are deleted with a warning: their batch
    /// never reached a segment.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ChecksumMismatch`] for a corrupt record, or an
    /// I/O error if the log cannot be listed.
    pub fn list(&self) -> IndexResult<Vec<LogRecord>> {
        let mut records = Vec::new();
        if !self.dir.exists() {
            return Ok(records);
        }

        for bucket in fs::read_dir(&self.dir)? {
            let bucket = bucket?;
            if !bucket.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(bucket.path())? {
                let entry = entry?;
                let path = entry.path();
                let name = entry.file_name();
                let Some(id) = name.to_str().and_then(|n| TransactionLogId::parse(n).ok()) else {
                    warn!(path = %path.display(), "ignoring foreign entry in transaction log");
                    continue;
                };

                let bytes = match fs::read(path.join(RECORD_FILE)) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
                match LogRecord::decode(&bytes)? {
                    Some(record) if record.id == id => records.push(record),
                    Some(record) => {
                        return Err(IndexError::transaction_log(format!(
                            "log record {} stored under {id}",
                            record.id
                        )))
                    }
                    None => {
                        warn!(log_id = %id, "discarding incomplete log record");
                        self.locks.remove_directory(&path, 1)?;
                    }
                }
            }
        }

        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::types::DocumentId;
    use tempfile::tempdir;

    fn log_in(root: &Path) -> TransactionLog {
        let dir = root.join("txlog");
        fs::create_dir_all(&dir).unwrap();
        TransactionLog::new(dir, Arc::new(DirectoryLocks::new()), true)
    }

    fn batch() -> IndexTransaction {
        IndexTransaction::from_parts(
            [Document::new("a")],
            [Document::new("u")],
            [DocumentId::from("r")],
        )
        .unwrap()
    }

    #[test]
    fn written_record_lists_logged_ids() {
        let root = tempdir().unwrap();
        let log = log_in(root.path());

        let id = log.write(&batch()).unwrap();
        let records = log.list().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert!(records[0].added.contains(&DocumentId::from("a")));
        assert!(records[0].added.contains(&DocumentId::from("u")));
        assert!(records[0].removed.contains(&DocumentId::from("r")));
        assert_eq!(log.read(id).unwrap(), Some(records[0].clone()));
    }

    #[test]
    fn remove_deletes_record_and_empty_bucket() {
        let root = tempdir().unwrap();
        let log = log_in(root.path());
        let id = log.write(&batch()).unwrap();

        assert!(log.remove(id).unwrap());
        assert!(log.list().unwrap().is_empty());
        assert_eq!(fs::read_dir(log.dir()).unwrap().count(), 0);
        assert!(log.dir().is_dir());

        // Second removal is a no-op.
        assert!(!log.remove(id).unwrap());
    }

    #[test]
    fn torn_record_is_discarded_on_list() {
        let root = tempdir().unwrap();
        let log = log_in(root.path());
        let keep = log.write(&batch()).unwrap();
        let torn = log.write(&batch()).unwrap();

        let path = log.record_dir(torn).join(RECORD_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        let records = log.list().unwrap();
        assert_eq!(records.iter().map(|r| r.id).collect::<Vec<_>>(), vec![keep]);
        assert!(!log.record_dir(torn).exists());
    }

    #[test]
    fn corrupt_record_fails_listing() {
        let root = tempdir().unwrap();
        let log = log_in(root.path());
        let id = log.write(&batch()).unwrap();

        let path = log.record_dir(id).join(RECORD_FILE);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();

        assert!(matches!(
            log.list(),
            Err(IndexError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn records_are_sharded_by_id_prefix() {
        let root = tempdir().unwrap();
        let log = log_in(root.path());
        let id = log.write(&batch()).unwrap();

        let text = id.to_string();
        assert!(log.dir().join(&text[..2]).join(&text).join(RECORD_FILE).is_file());
    }
}
