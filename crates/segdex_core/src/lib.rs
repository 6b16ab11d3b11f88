//! # segdex core
//!
//! Write-buffered, crash-recoverable manager for a segmented search index.
//!
//! This crate provides:
//! - Memory segments for small batches, flushed and merged by policy
//! - A persistent segment store with an atomically rewritten registry
//! - A per-batch transaction log, repaired from the content layer on start
//! - A startup gate that queues batches and rebuilds empty indexes
//! - Directory locking for concurrent creation and removal of nested paths
//!
//! ```rust,ignore
//! use segdex_core::{Document, IndexTransaction, SearchIndex};
//!
//! let index = SearchIndex::open("data/index", recovery)?;
//! index.start()?;
//!
//! let mut txn = IndexTransaction::new();
//! txn.add(Document::new("doc-1").with_field("title", "hello"))?;
//! index.save(&txn)?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod document;
mod error;
mod index;
mod lock;
pub mod manager;
pub mod policy;
mod recovery;
mod registry;
mod scheduler;
pub mod segment;
mod stats;
mod transaction;
mod types;
pub mod wal;

pub use config::IndexConfig;
pub use dir::{IndexDir, SEGMENT_DATA_FILE};
pub use document::Document;
pub use error::{IndexError, IndexResult};
pub use index::{IndexBuilder, SearchIndex};
pub use lock::DirectoryLocks;
pub use manager::{
    BufferedIndexManager, IndexManager, StartableIndexManager, TransactionalIndexManager,
};
pub use policy::{AggregatePolicy, CountBoundedPolicy, SegmentStats, ThresholdPolicy};
pub use recovery::{ContentIndexer, ContentSource, IndexerRecovery, RecoveryService};
pub use registry::SegmentRegistry;
pub use scheduler::{Scheduler, TaskHandle};
pub use segment::{IndexReader, MemorySegment, PersistentStore};
pub use stats::{IndexStats, StatsSnapshot};
pub use transaction::{IndexTransaction, ModificationReport};
pub use types::{DocumentId, SegmentKey, SegmentName, TransactionLogId};
pub use wal::TransactionLog;
