//! Property-based test generators using proptest.
//!
//! Provides strategies for documents, mutation batches, segment snapshots
//! and policies that respect the index's invariants.

use proptest::prelude::*;
use segdex_core::{
    CountBoundedPolicy, Document, DocumentId, IndexTransaction, SegmentKey, SegmentStats,
    ThresholdPolicy,
};
use std::collections::BTreeSet;
use std::time::Duration;

/// Strategy for ids drawn from a small pool, so batches collide often.
pub fn document_id_strategy() -> impl Strategy<Value = DocumentId> {
    (0u8..32).prop_map(|n| DocumentId::new(format!("doc-{n:02}")))
}

/// Strategy for documents with one to three text fields.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    (
        document_id_strategy(),
        prop::collection::btree_map(
            prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
            prop::string::string_regex("[a-z ]{0,24}").expect("Invalid regex"),
            1..4,
        ),
    )
        .prop_map(|(id, fields)| {
            let mut doc = Document::new(id);
            for (field, value) in fields {
                doc.add_field(field, value);
            }
            doc
        })
}

/// One step of a workload.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Add or re-add documents.
    Add(Vec<Document>),
    /// Remove ids.
    Remove(Vec<DocumentId>),
}

impl Operation {
    /// Turns the step into a batch. Later documents win on duplicate ids.
    pub fn to_transaction(&self) -> IndexTransaction {
        let mut txn = IndexTransaction::new();
        match self {
            Operation::Add(docs) => {
                for doc in docs {
                    txn.add(doc.clone()).expect("additions never conflict");
                }
            }
            Operation::Remove(ids) => {
                for id in ids {
                    txn.remove(id.clone()).expect("removals never conflict");
                }
            }
        }
        txn
    }
}

/// Strategy for workload steps; additions come in small and large batches.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        3 => prop::collection::vec(document_strategy(), 1..4).prop_map(Operation::Add),
        1 => prop::collection::vec(document_strategy(), 10..20).prop_map(Operation::Add),
        2 => prop::collection::vec(document_id_strategy(), 1..6).prop_map(Operation::Remove),
    ]
}

/// Strategy for batches whose added, updated and removed sets are disjoint.
pub fn transaction_strategy() -> impl Strategy<Value = IndexTransaction> {
    (
        prop::collection::vec(document_strategy(), 0..6),
        prop::collection::vec(document_strategy(), 0..4),
        prop::collection::vec(document_id_strategy(), 0..6),
    )
        .prop_map(|(added, updated, removed)| {
            let mut txn = IndexTransaction::new();
            let mut claimed = BTreeSet::new();
            for doc in added {
                if claimed.insert(doc.id().clone()) {
                    txn.add(doc).expect("unclaimed id");
                }
            }
            for doc in updated {
                if claimed.insert(doc.id().clone()) {
                    txn.update(doc).expect("unclaimed id");
                }
            }
            for id in removed {
                if claimed.insert(id.clone()) {
                    txn.remove(id).expect("unclaimed id");
                }
            }
            txn
        })
}

/// Strategy for segment snapshots with unique keys in creation order.
pub fn segment_stats_strategy() -> impl Strategy<Value = Vec<SegmentStats>> {
    prop::collection::vec((1usize..500, 1u64..1_000_000, 0u64..120), 0..16).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (documents, bytes, idle))| SegmentStats {
                key: SegmentKey(i as u64),
                document_count: documents,
                byte_size: bytes,
                idle: Duration::from_secs(idle),
            })
            .collect()
    })
}

/// Strategy for count-bounded policies.
pub fn count_policy_strategy() -> impl Strategy<Value = CountBoundedPolicy> {
    (1usize..12).prop_map(CountBoundedPolicy::new)
}

/// Strategy for threshold policies with any subset of limits set.
pub fn threshold_policy_strategy() -> impl Strategy<Value = ThresholdPolicy> {
    (
        prop::option::of(1usize..8),
        prop::option::of(1u64..2_000_000),
        prop::option::of(1u64..2_000_000),
        prop::option::of(1usize..1_000),
        prop::option::of(1usize..1_000),
        prop::option::of(0u64..120),
    )
        .prop_map(
            |(min_segments, min_bytes, max_bytes, min_documents, max_documents, min_idle)| {
                ThresholdPolicy {
                    min_segments,
                    min_bytes,
                    max_bytes,
                    min_documents,
                    max_documents,
                    min_idle: min_idle.map(Duration::from_secs),
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use segdex_core::{AggregatePolicy, ModificationReport};

    fn in_input_order(stats: &[SegmentStats], picked: &[SegmentKey]) -> bool {
        let positions: Vec<usize> = picked
            .iter()
            .filter_map(|k| stats.iter().position(|s| s.key == *k))
            .collect();
        positions.len() == picked.len() && positions.windows(2).all(|w| w[0] < w[1])
    }

    proptest! {
        #[test]
        fn generated_batches_are_disjoint(txn in transaction_strategy()) {
            for id in txn.added().keys() {
                prop_assert!(!txn.removed().contains(id));
                prop_assert!(!txn.updated().contains_key(id));
            }
        }

        #[test]
        fn claiming_everything_leaves_nothing(txn in transaction_strategy()) {
            let report = ModificationReport::from_sets(
                txn.added().keys().cloned().collect(),
                txn.updated().keys().cloned().collect(),
                txn.removed().clone(),
            );
            prop_assert!(txn.apply(&report).is_empty());
        }

        #[test]
        fn count_policy_restores_the_ceiling(
            stats in segment_stats_strategy(),
            policy in count_policy_strategy(),
        ) {
            let picked = policy.find_candidates(&stats);
            prop_assert!(in_input_order(&stats, &picked));
            if stats.len() > policy.max_segments {
                prop_assert!(picked.len() >= 2);
                prop_assert_eq!(stats.len() - picked.len() + 1, policy.max_segments);
            } else {
                prop_assert!(picked.is_empty());
            }
        }

        #[test]
        fn threshold_policy_is_deterministic(
            stats in segment_stats_strategy(),
            policy in threshold_policy_strategy(),
        ) {
            let before = stats.clone();
            let first = policy.find_candidates(&stats);
            let second = policy.find_candidates(&stats);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&stats, &before);
            prop_assert!(in_input_order(&stats, &first));
        }
    }
}
