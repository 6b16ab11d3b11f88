//! Content-side recovery interfaces.
//!
//! The index never owns document bodies: after a crash it asks the content
//! layer to rebuild them. [`ContentIndexer`] turns a content entry into a
//! [`Document`], [`RecoveryService`] produces repair batches.

use crate::document::Document;
use crate::error::{IndexError, IndexResult};
use crate::transaction::IndexTransaction;
use crate::types::DocumentId;
use std::collections::BTreeSet;

/// Turns content entries into index documents.
pub trait ContentIndexer: Send + Sync {
    /// Content-layer representation of an entry.
    type Entry;

    /// Builds the document for `entry`.
    fn create_document(&self, entry: &Self::Entry) -> IndexResult<Document>;
}

/// Rebuilds index state from the content layer.
pub trait RecoveryService: Send + Sync {
    /// Returns the batch that brings `ids` back in line with content: ids
    /// that still exist are re-added, the rest removed.
    fn recover(&self, ids: &BTreeSet<DocumentId>) -> IndexResult<IndexTransaction>;

    /// Feeds batches covering every content entry to `sink`.
    fn recover_all(
        &self,
        sink: &mut dyn FnMut(IndexTransaction) -> IndexResult<()>,
    ) -> IndexResult<()>;
}

/// Read access to the entries of the content layer.
pub trait ContentSource: Send + Sync {
    /// Content-layer representation of an entry.
    type Entry;

    /// Looks up one entry.
    fn get(&self, id: &DocumentId) -> IndexResult<Option<Self::Entry>>;

    /// Visits every entry.
    fn for_each(&self, visit: &mut dyn FnMut(Self::Entry) -> IndexResult<()>) -> IndexResult<()>;
}

/// [`RecoveryService`] built from a content source and an indexer.
#[derive(Debug)]
pub struct IndexerRecovery<S, I> {
    source: S,
    indexer: I,
    batch_size: usize,
}

impl<S, I> IndexerRecovery<S, I>
where
    S: ContentSource,
    I: ContentIndexer<Entry = S::Entry>,
{
    /// Creates the service; full rebuilds are fed in batches of 500.
    pub fn new(source: S, indexer: I) -> Self {
        Self {
            source,
            indexer,
            batch_size: 500,
        }
    }

    /// Sets the full-rebuild batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The wrapped content source.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S, I> RecoveryService for IndexerRecovery<S, I>
where
    S: ContentSource,
    I: ContentIndexer<Entry = S::Entry>,
{
    fn recover(&self, ids: &BTreeSet<DocumentId>) -> IndexResult<IndexTransaction> {
        let mut txn = IndexTransaction::new();
        for id in ids {
            match self.source.get(id)? {
                Some(entry) => {
                    let doc = self.indexer.create_document(&entry)?;
                    if doc.id() != id {
                        return Err(IndexError::index(format!(
                            "indexer produced {} for entry {id}",
                            doc.id()
                        )));
                    }
                    txn.add(doc)?;
                }
                None => txn.remove(id.clone())?,
            }
        }
        Ok(txn)
    }

    fn recover_all(
        &self,
        sink: &mut dyn FnMut(IndexTransaction) -> IndexResult<()>,
    ) -> IndexResult<()> {
        let mut batch = IndexTransaction::new();
        let mut pending = 0;
        self.source.for_each(&mut |entry| {
            batch.add(self.indexer.create_document(&entry)?)?;
            pending += 1;
            if pending >= self.batch_size {
                pending = 0;
                sink(std::mem::take(&mut batch))?;
            }
            Ok(())
        })?;
        if !batch.is_empty() {
            sink(batch)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MapSource(BTreeMap<String, String>);

    impl ContentSource for MapSource {
        type Entry = (String, String);

        fn get(&self, id: &DocumentId) -> IndexResult<Option<Self::Entry>> {
            Ok(self
                .0
                .get(id.as_str())
                .map(|title| (id.as_str().to_string(), title.clone())))
        }

        fn for_each(
            &self,
            visit: &mut dyn FnMut(Self::Entry) -> IndexResult<()>,
        ) -> IndexResult<()> {
            for (id, title) in &self.0 {
                visit((id.clone(), title.clone()))?;
            }
            Ok(())
        }
    }

    struct TitleIndexer;

    impl ContentIndexer for TitleIndexer {
        type Entry = (String, String);

        fn create_document(&self, entry: &Self::Entry) -> IndexResult<Document> {
            Ok(Document::new(entry.0.as_str()).with_field("title", entry.1.as_str()))
        }
    }

    fn service() -> IndexerRecovery<MapSource, TitleIndexer> {
        let source = MapSource(
            (0..5)
                .map(|i| (format!("doc-{i}"), format!("title {i}")))
                .collect(),
        );
        IndexerRecovery::new(source, TitleIndexer).with_batch_size(2)
    }

    #[test]
    fn recover_re_adds_existing_and_removes_missing() {
        let ids: BTreeSet<DocumentId> = ["doc-1", "gone"].into_iter().map(DocumentId::from).collect();
        let txn = service().recover(&ids).unwrap();

        assert_eq!(txn.added().len(), 1);
        assert!(txn.added().contains_key(&DocumentId::from("doc-1")));
        assert!(txn.removed().contains(&DocumentId::from("gone")));
    }

    #[test]
    fn recover_all_batches_every_entry() {
        let mut sizes = Vec::new();
        service()
            .recover_all(&mut |txn| {
                sizes.push(txn.added().len());
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn sink_errors_stop_recovery() {
        let mut calls = 0;
        let err = service()
            .recover_all(&mut |_| {
                calls += 1;
                Err(IndexError::index("disk full"))
            })
            .unwrap_err();
        assert!(matches!(err, IndexError::Index { .. }));
        assert_eq!(calls, 1);
    }
}
