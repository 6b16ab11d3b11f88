//! Layered index managers.
//!
//! A save flows through three layers, each wrapping the next:
//!
//! ```text
//! StartableIndexManager      queues batches until started, full rebuilds
//!   └─ TransactionalIndexManager   log record per batch, crash repair
//!        └─ BufferedIndexManager   memory segments, flush, aggregation
//!             └─ PersistentStore
//! ```
//!
//! Layers only talk through [`IndexManager`], so any of them can be left
//! out (an index without a transaction log skips the middle layer).

mod buffered;
mod startable;
mod transactional;

pub use buffered::BufferedIndexManager;
pub use startable::StartableIndexManager;
pub use transactional::TransactionalIndexManager;

use crate::error::IndexResult;
use crate::segment::IndexReader;
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::DocumentId;
use std::collections::BTreeSet;

/// Operations every index layer exposes.
pub trait IndexManager: Send + Sync {
    /// Applies a batch, returning what was changed.
    fn save(&self, txn: &IndexTransaction) -> IndexResult<ModificationReport>;

    /// Returns a consistent reader over every layer.
    fn reader(&self) -> IndexResult<IndexReader>;

    /// Number of live documents.
    fn document_count(&self) -> usize;

    /// Bytes used on disk, plus memory segments if `include_memory`.
    fn directory_size(&self, include_memory: bool) -> u64;

    /// Returns true if `id` is live in any layer.
    fn document_exists(&self, id: &DocumentId) -> bool;

    /// Field names of live documents.
    fn field_names(&self) -> BTreeSet<String>;

    /// Starts background work and recovery.
    fn start(&self) -> IndexResult<()>;

    /// Flushes and stops background work. Calling it twice is harmless.
    fn stop(&self) -> IndexResult<()>;

    /// Drops every document without stopping the index.
    fn clear(&self) -> IndexResult<()>;
}
