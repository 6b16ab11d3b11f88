//! Modification reports.

use crate::types::DocumentId;
use std::collections::BTreeSet;

/// What one layer actually changed for a batch.
///
/// Reports are values: combining two reports produces a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationReport {
    added: BTreeSet<DocumentId>,
    updated: BTreeSet<DocumentId>,
    removed: BTreeSet<DocumentId>,
    buffered: bool,
}

impl ModificationReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a report from the three id sets.
    #[must_use]
    pub fn from_sets(
        added: BTreeSet<DocumentId>,
        updated: BTreeSet<DocumentId>,
        removed: BTreeSet<DocumentId>,
    ) -> Self {
        Self {
            added,
            updated,
            removed,
            buffered: false,
        }
    }

    /// Creates a report claiming only added ids.
    #[must_use]
    pub fn with_added(added: BTreeSet<DocumentId>) -> Self {
        Self::from_sets(added, BTreeSet::new(), BTreeSet::new())
    }

    /// Ids added at this layer.
    #[must_use]
    pub fn added(&self) -> &BTreeSet<DocumentId> {
        &self.added
    }

    /// Ids whose body was replaced at this layer.
    #[must_use]
    pub fn updated(&self) -> &BTreeSet<DocumentId> {
        &self.updated
    }

    /// Ids removed at this layer.
    #[must_use]
    pub fn removed(&self) -> &BTreeSet<DocumentId> {
        &self.removed
    }

    /// Returns true if any id was touched.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }

    /// Returns true unless some added documents live only in memory.
    ///
    /// A non-durable report means a memory segment now owns the batch's
    /// transaction log record.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !self.buffered
    }

    /// Marks the report as held in memory.
    #[must_use]
    pub fn into_buffered(mut self) -> Self {
        self.buffered = true;
        self
    }

    /// Returns a copy with the buffered flag set to `buffered`.
    #[must_use]
    pub fn with_buffered(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    /// Combines two reports.
    #[must_use]
    pub fn merge(mut self, other: ModificationReport) -> Self {
        self.added.extend(other.added);
        self.updated.extend(other.updated);
        self.removed.extend(other.removed);
        self.buffered |= other.buffered;
        self
    }
}
