//! In-memory content layer.
//!
//! Stands in for the document store an index is built from, so recovery
//! and rebuilds can be checked against a known source of truth.

use parking_lot::{Mutex, RwLock};
use segdex_core::{
    ContentIndexer, ContentSource, Document, DocumentId, IndexResult, IndexTransaction,
    IndexerRecovery, RecoveryService,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One entry of the content store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Entry id, shared with the index document.
    pub id: String,
    /// Title field.
    pub title: String,
    /// Body field.
    pub body: String,
}

impl ContentEntry {
    /// Creates an entry.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Shared, cloneable content store.
#[derive(Debug, Clone, Default)]
pub struct MemoryContent {
    entries: Arc<RwLock<BTreeMap<String, ContentEntry>>>,
}

impl MemoryContent {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `count` entries named `doc-0`, `doc-1`, ...
    pub fn populated(count: usize) -> Self {
        let content = Self::new();
        for i in 0..count {
            content.put(ContentEntry::new(
                format!("doc-{i}"),
                format!("title {i}"),
                format!("body of document {i}"),
            ));
        }
        content
    }

    /// Inserts or replaces an entry.
    pub fn put(&self, entry: ContentEntry) {
        self.entries.write().insert(entry.id.clone(), entry);
    }

    /// Removes an entry, returning it if it existed.
    pub fn delete(&self, id: &str) -> Option<ContentEntry> {
        self.entries.write().remove(id)
    }

    /// Looks up an entry.
    pub fn entry(&self, id: &str) -> Option<ContentEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Ids of all entries.
    pub fn ids(&self) -> BTreeSet<DocumentId> {
        self.entries.read().keys().map(|id| DocumentId::from(id.as_str())).collect()
    }
}

impl ContentSource for MemoryContent {
    type Entry = ContentEntry;

    fn get(&self, id: &DocumentId) -> IndexResult<Option<ContentEntry>> {
        Ok(self.entry(id.as_str()))
    }

    fn for_each(&self, visit: &mut dyn FnMut(ContentEntry) -> IndexResult<()>) -> IndexResult<()> {
        let snapshot: Vec<ContentEntry> = self.entries.read().values().cloned().collect();
        for entry in snapshot {
            visit(entry)?;
        }
        Ok(())
    }
}

/// Indexes the title and body of a content entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextIndexer;

impl ContentIndexer for TextIndexer {
    type Entry = ContentEntry;

    fn create_document(&self, entry: &ContentEntry) -> IndexResult<Document> {
        Ok(document_for(entry))
    }
}

/// Builds the document [`TextIndexer`] would produce for `entry`.
pub fn document_for(entry: &ContentEntry) -> Document {
    Document::new(entry.id.as_str())
        .with_field("title", entry.title.as_str())
        .with_field("body", entry.body.as_str())
}

/// Recovery service over a [`MemoryContent`] store.
pub type ContentRecovery = IndexerRecovery<MemoryContent, TextIndexer>;

/// Recovery wrapper that records every request.
#[derive(Debug)]
pub struct RecordingRecovery<R> {
    inner: R,
    recovered: Mutex<Vec<BTreeSet<DocumentId>>>,
    full_rebuilds: AtomicUsize,
}

impl<R: RecoveryService> RecordingRecovery<R> {
    /// Wraps `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            recovered: Mutex::new(Vec::new()),
            full_rebuilds: AtomicUsize::new(0),
        }
    }

    /// Id sets passed to `recover`, in call order.
    pub fn recovered(&self) -> Vec<BTreeSet<DocumentId>> {
        self.recovered.lock().clone()
    }

    /// Number of full rebuilds requested.
    pub fn full_rebuilds(&self) -> usize {
        self.full_rebuilds.load(Ordering::SeqCst)
    }

    /// Forgets past requests.
    pub fn reset(&self) {
        self.recovered.lock().clear();
        self.full_rebuilds.store(0, Ordering::SeqCst);
    }
}

impl RecordingRecovery<ContentRecovery> {
    /// Records requests against `content`.
    pub fn for_content(content: MemoryContent) -> Self {
        Self::new(IndexerRecovery::new(content, TextIndexer))
    }
}

impl<R: RecoveryService> RecoveryService for RecordingRecovery<R> {
    fn recover(&self, ids: &BTreeSet<DocumentId>) -> IndexResult<IndexTransaction> {
        self.recovered.lock().push(ids.clone());
        self.inner.recover(ids)
    }

    fn recover_all(
        &self,
        sink: &mut dyn FnMut(IndexTransaction) -> IndexResult<()>,
    ) -> IndexResult<()> {
        self.full_rebuilds.fetch_add(1, Ordering::SeqCst);
        self.inner.recover_all(sink)
    }
}
