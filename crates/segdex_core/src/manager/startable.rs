//! Startup gate and full rebuilds.

use crate::dir::sync_directory;
use crate::error::{IndexError, IndexResult};
use crate::manager::IndexManager;
use crate::recovery::RecoveryService;
use crate::segment::IndexReader;
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::DocumentId;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Default)]
struct GateState {
    started: bool,
    queue: Vec<IndexTransaction>,
}

/// Outermost index layer.
///
/// Batches saved before [`start`](IndexManager::start) are queued instead of
/// applied. Starting replays the queue in order first. If the index is still
/// empty afterwards, or an earlier rebuild was interrupted, everything is then
/// rebuilt from the content layer and the replayed queue is discarded. Saves
/// issued while starting wait for it to finish.
pub struct StartableIndexManager {
    inner: Arc<dyn IndexManager>,
    recovery: Arc<dyn RecoveryService>,
    marker: PathBuf,
    gate: Mutex<GateState>,
}

impl fmt::Debug for StartableIndexManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.gate.lock();
        f.debug_struct("StartableIndexManager")
            .field("marker", &self.marker)
            .field("started", &gate.started)
            .field("queued", &gate.queue.len())
            .finish_non_exhaustive()
    }
}

impl StartableIndexManager {
    /// Wraps `inner`; `marker` is the file flagging an unfinished rebuild.
    pub fn new(
        inner: Arc<dyn IndexManager>,
        recovery: Arc<dyn RecoveryService>,
        marker: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            recovery,
            marker: marker.into(),
            gate: Mutex::new(GateState::default()),
        }
    }

    /// Returns true once [`start`](IndexManager::start) has succeeded.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.gate.lock().started
    }

    /// Number of batches waiting for start.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.gate.lock().queue.len()
    }

    fn needs_rebuild(&self) -> bool {
        if self.marker.exists() {
            warn!(marker = %self.marker.display(), "previous rebuild did not finish");
            return true;
        }
        if self.inner.document_count() == 0 {
            info!("index is empty");
            return true;
        }
        false
    }

    fn rebuild(&self) -> IndexResult<()> {
        create_marker(&self.marker)?;
        self.inner.clear()?;

        let mut batches = 0usize;
        self.recovery.recover_all(&mut |txn| {
            batches += 1;
            self.inner.save(&txn).map(|_| ())
        })?;

        fs::remove_file(&self.marker).map_err(|e| {
            IndexError::index(format!(
                "cannot remove rebuild marker {}: {e}",
                self.marker.display()
            ))
        })?;
        info!(
            batches,
            documents = self.inner.document_count(),
            "full rebuild complete"
        );
        Ok(())
    }
}

fn create_marker(path: &Path) -> IndexResult<()> {
    let created = File::create(path).and_then(|f| f.sync_all());
    if let Err(e) = created {
        return Err(IndexError::index(format!(
            "cannot create rebuild marker {}: {e}",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    Ok(())
}

impl IndexManager for StartableIndexManager {
    fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        {
            let mut gate = self.gate.lock();
            if !gate.started {
                if !txn.is_empty() {
                    gate.queue.push(txn.clone());
                    debug!(queued = gate.queue.len(), "batch queued until start");
                }
                return Ok(ModificationReport::new());
            }
        }
        self.inner.save(txn)
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
        let mut gate = self.gate.lock();
        if gate.started {
            return Ok(());
        }
        self.inner.start()?;

        let queue = std::mem::take(&mut gate.queue);
        for (pos, txn) in queue.iter().enumerate() {
            if let Err(e) = self.inner.save(txn) {
                gate.queue = queue[pos..].to_vec();
                return Err(e);
            }
        }
        if !queue.is_empty() {
            info!(replayed = queue.len(), "queued batches applied");
        }

        if self.needs_rebuild() {
            if let Err(e) = self.rebuild() {
                gate.queue = queue;
                return Err(e);
            }
            if !queue.is_empty() {
                debug!(batches = queue.len(), "replayed batches superseded by rebuild");
            }
        }

        gate.started = true;
        info!("index started");
        Ok(())
    }

    fn stop(&self) -> IndexResult<()> {
        self.inner.stop()
    }

    fn clear(&self) -> IndexResult<()> {
        self.inner.clear()
    }
}
