//! In-memory segments.

use crate::document::Document;
use crate::error::IndexResult;
use crate::policy::SegmentStats;
use crate::transaction::{IndexTransaction, ModificationReport};
use crate::types::{DocumentId, SegmentKey, TransactionLogId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

/// Point-in-time view of a memory segment's documents.
pub type MemorySnapshot = Arc<BTreeMap<DocumentId, Arc<Document>>>;

/// A small batch of documents held in memory until flushed.
///
/// The document map is copy-on-write: readers hold a [`MemorySnapshot`]
/// and later mutations clone the map instead of changing what they see.
/// The segment owns the log records of every batch it holds; they are
/// deleted once the segment is flushed or emptied.
#[derive(Debug, Clone)]
pub struct MemorySegment {
    key: SegmentKey,
    docs: MemorySnapshot,
    sizes: BTreeMap<DocumentId, u64>,
    byte_size: u64,
    last_modified: Instant,
    log_ids: BTreeSet<TransactionLogId>,
}

impl MemorySegment {
    /// Creates a segment holding the added documents of `txn`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if a document cannot be sized.
    pub fn new(key: SegmentKey, txn: &IndexTransaction) -> IndexResult<Self> {
        let mut segment = Self {
            key,
            docs: Arc::new(BTreeMap::new()),
            sizes: BTreeMap::new(),
            byte_size: 0,
            last_modified: Instant::now(),
            log_ids: txn.log_id().into_iter().collect(),
        };
        for doc in txn.added().values() {
            segment.insert(doc.clone())?;
        }
        Ok(segment)
    }

    fn insert(&mut self, doc: Document) -> IndexResult<()> {
        let size = doc.encoded_size()?;
        let id = doc.id().clone();
        if let Some(old) = self.sizes.insert(id.clone(), size) {
            self.byte_size -= old;
        }
        self.byte_size += size;
        Arc::make_mut(&mut self.docs).insert(id, Arc::new(doc));
        Ok(())
    }

    fn evict(&mut self, id: &DocumentId) -> bool {
        if !self.docs.contains_key(id) {
            return false;
        }
        Arc::make_mut(&mut self.docs).remove(id);
        if let Some(size) = self.sizes.remove(id) {
            self.byte_size -= size;
        }
        true
    }

    /// Applies the updates and removals of `txn` that target documents this
    /// segment holds.
    ///
    /// Additions are ignored. An update replaces the body in memory, so the
    /// segment also takes ownership of the batch's log record and the
    /// report is marked buffered.
    ///
    /// # Errors
    ///
    /// Returns a codec error if an updated document cannot be sized.
    pub fn apply(&mut self, txn: &IndexTransaction) -> IndexResult<ModificationReport> {
        let mut updated = BTreeSet::new();
        let mut removed = BTreeSet::new();

        for id in txn.removed() {
            if self.evict(id) {
                removed.insert(id.clone());
            }
        }
        for (id, doc) in txn.updated() {
            if self.docs.contains_key(id) {
                self.insert(doc.clone())?;
                updated.insert(id.clone());
            }
        }

        let claimed_update = !updated.is_empty();
        let report = ModificationReport::from_sets(BTreeSet::new(), updated, removed);
        if report.is_modified() {
            self.last_modified = Instant::now();
        }
        if claimed_update {
            self.log_ids.extend(txn.log_id());
            return Ok(report.into_buffered());
        }
        Ok(report)
    }

    /// Merges several segments into one under `key`.
    ///
    /// Later segments win on id collisions; log records are carried over.
    /// The sources are left untouched.
    #[must_use]
    pub fn merge(key: SegmentKey, segments: &[&MemorySegment]) -> Self {
        let mut docs = BTreeMap::new();
        let mut sizes = BTreeMap::new();
        let mut log_ids = BTreeSet::new();
        for segment in segments {
            log_ids.extend(segment.log_ids.iter().copied());
            for (id, doc) in segment.docs.iter() {
                docs.insert(id.clone(), Arc::clone(doc));
                sizes.insert(id.clone(), segment.sizes.get(id).copied().unwrap_or(0));
            }
        }
        Self {
            key,
            byte_size: sizes.values().sum(),
            docs: Arc::new(docs),
            sizes,
            last_modified: Instant::now(),
            log_ids,
        }
    }

    /// Segment key, increasing with creation order.
    #[must_use]
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    /// Current documents, shared with readers.
    #[must_use]
    pub fn snapshot(&self) -> MemorySnapshot {
        Arc::clone(&self.docs)
    }

    /// Iterates over held documents.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values().map(AsRef::as_ref)
    }

    /// Returns true if the segment holds `id`.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    /// Number of held documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.docs.len()
    }

    /// Returns true when no documents remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Encoded size of the held documents.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Log records owned by this segment.
    #[must_use]
    pub fn log_ids(&self) -> &BTreeSet<TransactionLogId> {
        &self.log_ids
    }

    /// Policy view of the segment at `now`.
    #[must_use]
    pub fn stats(&self, now: Instant) -> SegmentStats {
        SegmentStats {
            key: self.key,
            document_count: self.docs.len(),
            byte_size: self.byte_size,
            idle: now.saturating_duration_since(self.last_modified),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, body: &str) -> Document {
        Document::new(id).with_field("body", body)
    }

    fn segment(key: u64, ids: &[&str]) -> MemorySegment {
        let txn = IndexTransaction::from_parts(
            ids.iter().map(|id| doc(id, "v1")),
            std::iter::empty(),
            std::iter::empty(),
        )
        .unwrap()
        .with_log(TransactionLogId::generate());
        MemorySegment::new(SegmentKey(key), &txn).unwrap()
    }

    #[test]
    fn new_segment_owns_batch_log() {
        let seg = segment(1, &["a", "b"]);
        assert_eq!(seg.document_count(), 2);
        assert_eq!(seg.log_ids().len(), 1);
        assert!(seg.byte_size() > 0);
    }

    #[test]
    fn removal_claims_only_held_ids() {
        let mut seg = segment(1, &["a", "b"]);
        let txn = IndexTransaction::from_parts(
            std::iter::empty(),
            std::iter::empty(),
            [DocumentId::from("a"), DocumentId::from("zz")],
        )
        .unwrap();

        let report = seg.apply(&txn).unwrap();
        assert_eq!(report.removed().len(), 1);
        assert!(report.removed().contains(&DocumentId::from("a")));
        assert!(report.is_durable());
        assert!(!seg.contains(&DocumentId::from("a")));
    }

    #[test]
    fn update_takes_log_ownership() {
        let mut seg = segment(1, &["a"]);
        let log = TransactionLogId::generate();
        let txn = IndexTransaction::from_parts(std::iter::empty(), [doc("a", "v2")], std::iter::empty())
            .unwrap()
            .with_log(log);

        let report = seg.apply(&txn).unwrap();
        assert!(!report.is_durable());
        assert!(seg.log_ids().contains(&log));
        let body = seg.snapshot()[&DocumentId::from("a")].field("body").map(<[String]>::to_vec);
        assert_eq!(body, Some(vec!["v2".to_string()]));
    }

    #[test]
    fn snapshots_are_isolated_from_later_changes() {
        let mut seg = segment(1, &["a", "b"]);
        let before = seg.snapshot();
        let txn = IndexTransaction::from_parts(
            std::iter::empty(),
            std::iter::empty(),
            [DocumentId::from("a")],
        )
        .unwrap();
        seg.apply(&txn).unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(seg.snapshot().len(), 1);
    }

    #[test]
    fn byte_size_tracks_contents() {
        let mut seg = segment(1, &["a"]);
        let txn = IndexTransaction::from_parts(
            std::iter::empty(),
            std::iter::empty(),
            [DocumentId::from("a")],
        )
        .unwrap();
        seg.apply(&txn).unwrap();
        assert!(seg.is_empty());
        assert_eq!(seg.byte_size(), 0);
    }

    #[test]
    fn merge_unions_documents_and_logs() {
        let (first, second) = (segment(1, &["a"]), segment(2, &["b", "c"]));
        let merged = MemorySegment::merge(SegmentKey(9), &[&first, &second]);
        assert_eq!(merged.key(), SegmentKey(9));
        assert_eq!(merged.document_count(), 3);
        assert_eq!(merged.log_ids().len(), 2);
        assert_eq!(merged.byte_size(), first.byte_size() + second.byte_size());
        assert_eq!(merged.stats(Instant::now()).document_count, 3);
    }
}
