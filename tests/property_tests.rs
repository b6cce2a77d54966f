//! Property-based tests using proptest.
//!
//! These tests verify invariants of the memory bank and relation tuples.

use metriclearn::mining::indices::{all_pairs_indices, all_triplets_indices};
use metriclearn::prelude::*;
use proptest::prelude::*;

fn labels_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(0i64..4, 0..max_len)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn queue_idx_is_modular_sum_of_batch_sizes(
        capacity in 1usize..40,
        batches in proptest::collection::vec(0usize..40, 1..12),
    ) {
        let mut bank = MemoryBank::new(2, capacity).expect("valid");
        let mut written = 0usize;
        for (step, &size) in batches.iter().enumerate() {
            let size = size.min(capacity);
            let embeddings = randn(size, 2, Some(step as u64));
            let labels = random_labels(size, 5, Some(step as u64));

            let (start, end) = bank.append(&embeddings, &labels).expect("append");
            written += size;

            prop_assert_eq!(bank.queue_idx(), written % capacity);
            prop_assert_eq!(bank.len(), written.min(capacity));
            prop_assert_eq!(bank.is_filled(), written >= capacity);

            if size > 0 {
                let (read, read_labels) = bank.read_range(start, end).expect("range");
                prop_assert_eq!(read, embeddings);
                prop_assert_eq!(read_labels, labels);
            }
        }
    }

    #[test]
    fn all_pairs_partition_by_label(
        labels in labels_strategy(12),
        ref_labels in labels_strategy(12),
    ) {
        let pairs = all_pairs_indices(&labels, Some(&ref_labels));
        prop_assert_eq!(pairs.len_positive() + pairs.len_negative(), labels.len() * ref_labels.len());
        for (&a, &p) in pairs.a1.iter().zip(&pairs.p) {
            prop_assert_eq!(labels[a], ref_labels[p]);
        }
        for (&a, &n) in pairs.a2.iter().zip(&pairs.n) {
            prop_assert_ne!(labels[a], ref_labels[n]);
        }
    }

    #[test]
    fn pair_triplet_conversion_preserves_labels(labels in labels_strategy(10)) {
        let triplets = all_pairs_indices(&labels, None).to_triplets();
        prop_assert_eq!(&triplets, &all_triplets_indices(&labels, None));
        for ((&a, &p), &n) in triplets.a.iter().zip(&triplets.p).zip(&triplets.n) {
            prop_assert_eq!(labels[a], labels[p]);
            prop_assert_ne!(labels[a], labels[n]);
        }

        let pairs = triplets.to_pairs();
        prop_assert!(pairs.a1.iter().zip(&pairs.p).all(|(&a, &p)| labels[a] == labels[p]));
        prop_assert!(pairs.a2.iter().zip(&pairs.n).all(|(&a, &n)| labels[a] != labels[n]));
    }

    #[test]
    fn shift_moves_only_reference_side(
        labels in labels_strategy(8),
        ref_labels in labels_strategy(8),
        offset in 0usize..64,
    ) {
        let pairs = all_pairs_indices(&labels, Some(&ref_labels));
        let shifted = pairs.clone().shift(offset);
        prop_assert_eq!(&shifted.a1, &pairs.a1);
        prop_assert_eq!(&shifted.a2, &pairs.a2);
        prop_assert!(shifted.p.iter().zip(&pairs.p).all(|(&s, &o)| s == o + offset));
        prop_assert!(shifted.n.iter().zip(&pairs.n).all(|(&s, &o)| s == o + offset));
    }

    #[test]
    fn contrastive_loss_is_finite_and_non_negative(
        rows in 1usize..10,
        seed in 0u64..1_000,
    ) {
        let embeddings = randn(rows, 4, Some(seed));
        let labels = random_labels(rows, 3, Some(seed + 1));
        let loss = ContrastiveLoss::default()
            .forward(&embeddings, &labels, None)
            .expect("forward")
            .item();
        prop_assert!(loss.is_finite());
        prop_assert!(loss >= 0.0);
    }
}
