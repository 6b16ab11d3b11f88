//! Transaction log wrapping and crash repair.

use crate::error::{IndexError, IndexResult};
use crate::manager::IndexManager;
use crate::recovery::RecoveryService;
use crate::segment::IndexReader;
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::{DocumentId, TransactionLogId};
use crate::wal::{LogRecord, TransactionLog};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Index layer that logs every batch before applying it.
///
/// A log record lives from before the first segment mutation until the
/// batch is durable. Records left behind by a crash name the documents that
/// may be inconsistent; [`start`](IndexManager::start) re-derives them from
/// the content layer.
pub struct TransactionalIndexManager {
    inner: Arc<dyn IndexManager>,
    log: Arc<TransactionLog>,
    recovery: Arc<dyn RecoveryService>,
}

impl fmt::Debug for TransactionalIndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalIndexManager")
            .field("log", &self.log.dir())
            .finish_non_exhaustive()
    }
}

impl TransactionalIndexManager {
    /// Wraps `inner`.
    pub fn new(
        inner: Arc<dyn IndexManager>,
        log: Arc<TransactionLog>,
        recovery: Arc<dyn RecoveryService>,
    ) -> Self {
        Self {
            inner,
            log,
            recovery,
        }
    }

    fn discard(&self, id: TransactionLogId) {
        if let Err(e) = self.log.remove(id) {
            warn!(log_id = %id, error = %e, "cannot remove log record of durable batch");
        }
    }

    fn repair(&self, records: &[LogRecord]) -> IndexResult<()> {
        let ids: BTreeSet<DocumentId> = records.iter().flat_map(LogRecord::ids).collect();
        warn!(
            records = records.len(),
            documents = ids.len(),
            "repairing documents of unfinished transactions"
        );

        let batch = self.recovery.recover(&ids)?;
        self.save(&batch)?;

        for record in records {
            self.discard(record.id);
        }
        info!(documents = ids.len(), "transaction log recovery complete");
        Ok(())
    }
}

impl IndexManager for TransactionalIndexManager {
    fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        if txn.is_empty() {
            return Ok(ModificationReport::new());
        }

        let log_id = self
            .log
            .write(txn)
            .map_err(|e| IndexError::transaction_failed("cannot log batch", e))?;

        let report = match self.inner.save(&txn.clone().with_log(log_id)) {
            Ok(report) => report,
            Err(e) => {
                error!(log_id = %log_id, error = %e, "batch failed, log record kept for repair");
                return Err(IndexError::transaction_failed(
                    format!("batch {log_id} was not applied"),
                    e,
                ));
            }
        };

        if report.is_durable() {
            self.discard(log_id);
        } else {
            debug!(log_id = %log_id, "log record handed to memory segment");
        }
        Ok(report)
    }

    fn reader(&self) -> IndexResult<IndexReader> {
        self.inner.reader()
    }

    fn document_count(&self) -> usize {
        self.inner.document_count()
    }

    fn directory_size(&self, include_memory: bool) -> u64 {
        self.inner.directory_size(include_memory)
    }

    fn document_exists(&self, id: &DocumentId) -> bool {
        self.inner.document_exists(id)
    }

    fn field_names(&self) -> BTreeSet<String> {
        self.inner.field_names()
    }

    fn start(&self) -> IndexResult<()> {
        self.inner.start()?;
        let records = self.log.list()?;
        if records.is_empty() {
            debug!("transaction log is clean");
            return Ok(());
        }
        self.repair(&records)
    }

    fn stop(&self) -> IndexResult<()> {
        self.inner.stop()
    }

    fn clear(&self) -> IndexResult<()> {
        self.inner.clear()
    }
}
