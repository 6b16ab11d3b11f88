//! Mutation batch state.

use crate::document::Document;
use crate::error::{IndexError, IndexResult};
use crate::transaction::report::ModificationReport;
use crate::types::{DocumentId, TransactionLogId};
use std::collections::{BTreeMap, BTreeSet};

/// A batch of document mutations.
///
/// An id appears in at most one of the added, updated and removed sets.
/// Updates carry the replacement body and behave as upserts once they reach
/// the persistent store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexTransaction {
    added: BTreeMap<DocumentId, Document>,
    updated: BTreeMap<DocumentId, Document>,
    removed: BTreeSet<DocumentId>,
    log_id: Option<TransactionLogId>,
}

impl IndexTransaction {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a batch from its parts, validating id uniqueness.
    pub fn from_parts(
        added: impl IntoIterator<Item = Document>,
        updated: impl IntoIterator<Item = Document>,
        removed: impl IntoIterator<Item = DocumentId>,
    ) -> IndexResult<Self> {
        let mut txn = Self::new();
        for doc in added {
            txn.add(doc)?;
        }
        for doc in updated {
            txn.update(doc)?;
        }
        for id in removed {
            txn.remove(id)?;
        }
        Ok(txn)
    }

    /// Records an added document.
    pub fn add(&mut self, doc: Document) -> IndexResult<()> {
        self.ensure_unclaimed(doc.id(), "added")?;
        self.added.insert(doc.id().clone(), doc);
        Ok(())
    }

    /// Records a replacement body for an existing document.
    pub fn update(&mut self, doc: Document) -> IndexResult<()> {
        self.ensure_unclaimed(doc.id(), "updated")?;
        self.updated.insert(doc.id().clone(), doc);
        Ok(())
    }

    /// Records a removal.
    pub fn remove(&mut self, id: DocumentId) -> IndexResult<()> {
        self.ensure_unclaimed(&id, "removed")?;
        self.removed.insert(id);
        Ok(())
    }

    fn ensure_unclaimed(&self, id: &DocumentId, as_what: &str) -> IndexResult<()> {
        let claimed = if self.added.contains_key(id) {
            Some("added")
        } else if self.updated.contains_key(id) {
            Some("updated")
        } else if self.removed.contains(id) {
            Some("removed")
        } else {
            None
        };
        match claimed {
            Some(existing) if existing != as_what => Err(IndexError::transaction(format!(
                "document {id} is already {existing} in this batch, cannot be {as_what}"
            ))),
            _ => Ok(()),
        }
    }

    /// Added documents by id.
    #[must_use]
    pub fn added(&self) -> &BTreeMap<DocumentId, Document> {
        &self.added
    }

    /// Updated documents by id.
    #[must_use]
    pub fn updated(&self) -> &BTreeMap<DocumentId, Document> {
        &self.updated
    }

    /// Removed ids.
    #[must_use]
    pub fn removed(&self) -> &BTreeSet<DocumentId> {
        &self.removed
    }

    /// Returns true if the batch carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// Returns true if updates or removals remain.
    #[must_use]
    pub fn has_modifications(&self) -> bool {
        !(self.updated.is_empty() && self.removed.is_empty())
    }

    /// Returns the transaction log record attached by the logging layer.
    #[must_use]
    pub fn log_id(&self) -> Option<TransactionLogId> {
        self.log_id
    }

    /// Returns a copy tagged with its transaction log record.
    #[must_use]
    pub fn with_log(mut self, log_id: TransactionLogId) -> Self {
        self.log_id = Some(log_id);
        self
    }

    /// Ids written to the log as "added": new documents and updated bodies.
    #[must_use]
    pub fn logged_added_ids(&self) -> BTreeSet<DocumentId> {
        self.added.keys().chain(self.updated.keys()).cloned().collect()
    }

    /// Returns the batch that remains after `report` has been claimed.
    ///
    /// Every id the report lists is dropped from the corresponding set. The
    /// log id is carried over unchanged.
    #[must_use]
    pub fn apply(&self, report: &ModificationReport) -> Self {
        let keep = |set: &BTreeSet<DocumentId>, id: &DocumentId| !set.contains(id);
        Self {
            added: self
                .added
                .iter()
                .filter(|(id, _)| keep(report.added(), id))
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect(),
            updated: self
                .updated
                .iter()
                .filter(|(id, _)| keep(report.updated(), id))
                .map(|(id, doc)| (id.clone(), doc.clone()))
                .collect(),
            removed: self
                .removed
                .iter()
                .filter(|id| keep(report.removed(), id))
                .cloned()
                .collect(),
            log_id: self.log_id,
        }
    }

    /// Returns only the additions of this batch.
    #[must_use]
    pub fn additions_only(&self) -> Self {
        Self {
            added: self.added.clone(),
            updated: BTreeMap::new(),
            removed: BTreeSet::new(),
            log_id: self.log_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn doc(id: &str) -> Document {
        Document::new(id).with_field("name", id)
    }

    #[test]
    fn same_id_cannot_be_added_and_removed() {
        let mut txn = IndexTransaction::new();
        txn.add(doc("a")).unwrap();
        let err = txn.remove(DocumentId::from("a")).unwrap_err();
        assert!(matches!(err, IndexError::Transaction { .. }));
    }

    #[test]
    fn re_adding_replaces_body() {
        let mut txn = IndexTransaction::new();
        txn.add(doc("a")).unwrap();
        txn.add(Document::new("a").with_field("name", "second")).unwrap();
        assert_eq!(txn.added().len(), 1);
        assert_eq!(
            txn.added()[&DocumentId::from("a")].field("name"),
            Some(&["second".to_string()][..])
        );
    }

    #[test]
    fn apply_drops_claimed_ids_only() {
        let txn = IndexTransaction::from_parts(
            [doc("a"), doc("b")],
            [doc("u")],
            [DocumentId::from("r1"), DocumentId::from("r2")],
        )
        .unwrap()
        .with_log(TransactionLogId::generate());

        let report = ModificationReport::from_sets(
            [DocumentId::from("a")].into(),
            [DocumentId::from("u")].into(),
            [DocumentId::from("r2")].into(),
        );
        let rest = txn.apply(&report);

        assert_eq!(rest.added().keys().collect::<Vec<_>>(), vec![&DocumentId::from("b")]);
        assert!(rest.updated().is_empty());
        assert_eq!(rest.removed().len(), 1);
        assert_eq!(rest.log_id(), txn.log_id());
        // The original value is untouched.
        assert_eq!(txn.added().len(), 2);
    }

    #[test]
    fn logged_ids_include_updates() {
        let txn = IndexTransaction::from_parts([doc("a")], [doc("u")], [DocumentId::from("r")])
            .unwrap();
        let ids: Vec<_> = txn.logged_added_ids().into_iter().collect();
        assert_eq!(ids, vec![DocumentId::from("a"), DocumentId::from("u")]);
    }

    proptest! {
        #[test]
        fn applying_own_full_report_empties_batch(
            added in prop::collection::btree_set("[a-m]{1,4}", 0..8),
            removed in prop::collection::btree_set("[n-z]{1,4}", 0..8),
        ) {
            let txn = IndexTransaction::from_parts(
                added.iter().map(|id| doc(id)),
                std::iter::empty(),
                removed.iter().map(|id| DocumentId::from(id.as_str())),
            ).unwrap();
            let report = ModificationReport::from_sets(
                txn.added().keys().cloned().collect(),
                BTreeSet::new(),
                txn.removed().clone(),
            );
            prop_assert!(txn.apply(&report).is_empty());
        }
    }
}
