//! Merged index readers.

use crate::document::Document;
use crate::error::IndexResult;
use crate::segment::memory::MemorySnapshot;
use crate::segment::store::PersistentView;
use crate::types::DocumentId;
use std::collections::BTreeSet;

/// A consistent read view over every index layer.
///
/// Built from the persistent view and one snapshot per memory segment,
/// newest last. A document lives in exactly one layer, so counts are sums.
#[derive(Debug, Clone, Default)]
pub struct IndexReader {
    persistent: Option<PersistentView>,
    memory: Vec<MemorySnapshot>,
}

impl IndexReader {
    /// A reader with nothing in it.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(persistent: Option<PersistentView>, memory: Vec<MemorySnapshot>) -> Self {
        Self { persistent, memory }
    }

    /// Number of live documents.
    #[must_use]
    pub fn num_docs(&self) -> usize {
        let persistent = self.persistent.as_ref().map_or(0, PersistentView::num_docs);
        persistent + self.memory.iter().map(|m| m.len()).sum::<usize>()
    }

    /// Number of layers this reader spans.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.memory.len() + usize::from(self.persistent.is_some())
    }

    /// Returns true if `id` is visible.
    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.memory.iter().any(|m| m.contains_key(id))
            || self.persistent.as_ref().is_some_and(|p| p.contains(id))
    }

    /// Looks up a document, newest layer first.
    ///
    /// # Errors
    ///
    /// Returns an error if a persistent record cannot be read.
    pub fn document(&self, id: &DocumentId) -> IndexResult<Option<Document>> {
        if let Some(doc) = self.memory.iter().rev().find_map(|m| m.get(id)) {
            return Ok(Some(Document::clone(doc)));
        }
        match &self.persistent {
            Some(view) => view.document(id),
            None => Ok(None),
        }
    }

    /// Every visible id, in order.
    #[must_use]
    pub fn document_ids(&self) -> BTreeSet<DocumentId> {
        let mut ids: BTreeSet<DocumentId> = self
            .persistent
            .iter()
            .flat_map(PersistentView::document_ids)
            .cloned()
            .collect();
        for snapshot in &self.memory {
            ids.extend(snapshot.keys().cloned());
        }
        ids
    }

    /// Every field name present in some layer.
    #[must_use]
    pub fn field_names(&self) -> BTreeSet<String> {
        let mut names = self
            .persistent
            .as_ref()
            .map(|p| p.field_names().clone())
            .unwrap_or_default();
        for snapshot in &self.memory {
            for doc in snapshot.values() {
                names.extend(doc.field_names().map(str::to_string));
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn snapshot(ids: &[&str]) -> MemorySnapshot {
        Arc::new(
            ids.iter()
                .map(|id| {
                    (
                        DocumentId::from(*id),
                        Arc::new(Document::new(*id).with_field("title", *id)),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn empty_reader_has_no_documents() {
        let reader = IndexReader::empty();
        assert_eq!(reader.num_docs(), 0);
        assert_eq!(reader.layer_count(), 0);
        assert!(reader.document(&DocumentId::from("x")).unwrap().is_none());
    }

    #[test]
    fn memory_layers_are_unioned() {
        let reader = IndexReader::new(None, vec![snapshot(&["a", "b"]), snapshot(&["c"])]);
        assert_eq!(reader.num_docs(), 3);
        assert!(reader.contains(&DocumentId::from("c")));
        assert_eq!(reader.document_ids().len(), 3);
        assert_eq!(
            reader.field_names().into_iter().collect::<Vec<_>>(),
            vec!["title".to_string()]
        );
        assert_eq!(
            reader.document(&DocumentId::from("b")).unwrap(),
            Some(Document::new("b").with_field("title", "b"))
        );
    }
}
