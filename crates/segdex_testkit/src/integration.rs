//! Cross-module integration helpers.
//!
//! [`IntegrationHarness`] drives an index with arbitrary batches and keeps
//! a plain map of what the index should contain, so any sequence of
//! buffering, merging and flushing can be checked against it.

use crate::fixtures::TestIndex;
use crate::generators::Operation;
use segdex_core::{Document, DocumentId, IndexConfig, IndexTransaction, ModificationReport};
use std::collections::BTreeMap;

/// A test harness tracking the expected index contents.
pub struct IntegrationHarness {
    /// The index under test.
    pub index: TestIndex,
    expected: BTreeMap<DocumentId, Document>,
}

impl IntegrationHarness {
    /// Creates a harness over an empty index.
    pub fn new(config: IndexConfig) -> Self {
        Self {
            index: TestIndex::with_content(crate::content::MemoryContent::new(), config),
            expected: BTreeMap::new(),
        }
    }

    /// Saves `txn` and records its effect.
    pub fn save(&mut self, txn: &IndexTransaction) -> ModificationReport {
        let report = self.index.save(txn).expect("Failed to save batch");
        for (id, doc) in txn.added().iter().chain(txn.updated()) {
            self.expected.insert(id.clone(), doc.clone());
        }
        for id in txn.removed() {
            self.expected.remove(id);
        }
        report
    }

    /// Saves one workload step.
    pub fn apply(&mut self, op: &Operation) -> ModificationReport {
        self.save(&op.to_transaction())
    }

    /// Number of documents the index should hold.
    pub fn expected_len(&self) -> usize {
        self.expected.len()
    }

    /// Asserts that the index holds exactly the expected documents.
    pub fn verify(&self) {
        let reader = self.index.reader().expect("Failed to open reader");
        let ids: Vec<DocumentId> = reader.document_ids().into_iter().collect();
        let expected_ids: Vec<DocumentId> = self.expected.keys().cloned().collect();
        assert_eq!(ids, expected_ids, "live ids differ");
        assert_eq!(self.index.document_count(), self.expected.len(), "document count differs");

        for (id, doc) in &self.expected {
            let actual = reader.document(id).expect("Failed to read document");
            assert_eq!(actual.as_ref(), Some(doc), "document {id} differs");
        }
    }

    /// Closes and reopens the index, keeping the expectations.
    pub fn reopen(self) -> Self {
        Self {
            index: self.index.reopen(),
            expected: self.expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_batch, remove_batch, test_config, update_batch};
    use crate::generators::operation_strategy;
    use proptest::prelude::*;
    use segdex_core::{DirectoryLocks, ThresholdPolicy, TransactionLog};
    use std::sync::Arc;

    fn log_record_count(index: &TestIndex) -> usize {
        TransactionLog::new(index.path().join("txlog"), Arc::new(DirectoryLocks::new()), false)
            .list()
            .expect("Failed to list log")
            .len()
    }

    #[test]
    fn removing_every_buffered_batch_empties_memory_and_log() {
        let mut h = IntegrationHarness::new(test_config().max_memory_segments(10));
        h.save(&add_batch(&["A"]));
        h.save(&add_batch(&["B"]));
        h.save(&add_batch(&["C"]));
        assert_eq!(h.index.stats().memory_segments, 3);
        assert_eq!(log_record_count(&h.index), 3);

        let report = h.save(&remove_batch(&["A", "B", "C"]));
        assert_eq!(report.removed().len(), 3);
        assert_eq!(h.index.stats().memory_segments, 0);
        assert_eq!(log_record_count(&h.index), 0);
        h.verify();
    }

    #[test]
    fn count_ceiling_of_two_leaves_two_segments() {
        let mut h = IntegrationHarness::new(test_config().max_memory_segments(2));
        h.save(&add_batch(&["a"]));
        h.save(&add_batch(&["b"]));
        h.save(&add_batch(&["c"]));

        let stats = h.index.stats();
        assert_eq!(stats.memory_segments, 2);
        assert_eq!(stats.memory_documents, 3);
        assert_eq!(log_record_count(&h.index), 3);
        h.verify();
    }

    #[test]
    fn flushing_twice_changes_nothing() {
        let mut h = IntegrationHarness::new(test_config());
        h.save(&add_batch(&["a", "b"]));
        h.index.flush().unwrap();
        let after_first = h.index.stats();
        h.index.flush().unwrap();
        let after_second = h.index.stats();

        assert_eq!(after_first.persistent_segments, after_second.persistent_segments);
        assert_eq!(after_first.persistent_documents, after_second.persistent_documents);
        assert_eq!(after_second.memory_segments, 0);
        h.verify();
    }

    #[test]
    fn flushed_batches_leave_no_log_records() {
        let mut h = IntegrationHarness::new(
            test_config().flush_policy(ThresholdPolicy::new().min_documents(4)),
        );
        h.save(&add_batch(&["a", "b"]));
        h.save(&add_batch(&["c"]));
        assert_eq!(log_record_count(&h.index), 2);

        let report = h.save(&add_batch(&["d"]));
        assert!(report.is_durable());
        assert_eq!(log_record_count(&h.index), 0);
        h.verify();
    }

    #[test]
    fn large_batches_are_durable_immediately() {
        let mut h = IntegrationHarness::new(test_config());
        let ids: Vec<String> = (0..12).map(|i| format!("big-{i}")).collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let report = h.save(&add_batch(&refs));
        assert!(report.is_durable());
        assert_eq!(h.index.stats().memory_segments, 0);
        assert_eq!(log_record_count(&h.index), 0);
        h.verify();
    }

    #[test]
    fn updates_reach_whichever_layer_holds_the_document() {
        let mut h = IntegrationHarness::new(test_config());
        let persisted: Vec<String> = (0..12).map(|i| format!("p-{i}")).collect();
        let refs: Vec<&str> = persisted.iter().map(String::as_str).collect();
        h.save(&add_batch(&refs));
        h.save(&add_batch(&["m"]));

        h.save(&update_batch(&["p-3", "m"], "changed"));
        h.verify();
        let h = h.reopen();
        h.verify();
    }

    #[test]
    fn buffered_documents_survive_restart() {
        let mut h = IntegrationHarness::new(test_config());
        h.save(&add_batch(&["seed-a", "seed-b"]));
        h.save(&add_batch(&["late"]));
        let h = h.reopen();
        h.verify();
        assert_eq!(h.index.stats().memory_segments, 0);
    }

    #[test]
    fn persistent_segments_merge_under_policy() {
        let mut h = IntegrationHarness::new(
            test_config()
                .small_batch_threshold(1)
                .persistent_merge_policy(ThresholdPolicy::new().min_segments(3)),
        );
        for i in 0..6 {
            h.save(&add_batch(&[format!("d-{i}").as_str()]));
        }
        h.save(&remove_batch(&["d-2"]));

        let stats = h.index.stats();
        assert!(stats.persistent_merges > 0);
        assert!(stats.persistent_segments < 6);
        h.verify();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn any_workload_matches_the_model(ops in prop::collection::vec(operation_strategy(), 1..24)) {
            let mut h = IntegrationHarness::new(
                test_config()
                    .max_memory_segments(3)
                    .flush_policy(ThresholdPolicy::new().min_documents(12))
                    .persistent_merge_policy(ThresholdPolicy::new().min_segments(4)),
            );
            for op in &ops {
                h.apply(op);
            }
            h.verify();
            let h = h.reopen();
            h.verify();
        }
    }
}
