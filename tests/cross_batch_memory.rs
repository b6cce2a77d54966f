//! End-to-end tests for the cross-batch memory wrapper.
//!
//! Each step's loss is checked against the wrapped loss evaluated directly on
//! `[batch; remembered batches]` with independently built relations.

use metriclearn::mining::indices::all_pairs_indices;
use metriclearn::prelude::*;

const EMBEDDING_SIZE: usize = 128;
const MEMORY_SIZE: usize = 321;
const BATCH_SIZE: usize = 32;

/// Route library events to the test output; `RUST_LOG=metriclearn=debug` shows them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

fn assert_close(actual: f32, expected: f32) {
    let tol = 1e-4 * expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= tol,
        "loss {actual} differs from expected {expected}"
    );
}

fn new_criterion(update_order: MemoryUpdate) -> CrossBatchMemory {
    criterion_with_memory(update_order, MEMORY_SIZE)
}

fn criterion_with_memory(update_order: MemoryUpdate, memory_size: usize) -> CrossBatchMemory {
    let config = CrossBatchMemoryConfig::new(EMBEDDING_SIZE, memory_size)
        .with_update_order(update_order);
    CrossBatchMemory::new(ContrastiveLoss::default(), config).expect("valid config")
}

/// The last `capacity` remembered rows, oldest first.
///
/// Row order differs from the bank's once it wraps, which leaves every
/// loss below unchanged.
struct History {
    capacity: usize,
    embeddings: Vec<f32>,
    labels: Vec<i64>,
}

impl History {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            embeddings: Vec::new(),
            labels: Vec::new(),
        }
    }

    fn push(&mut self, embeddings: &Tensor, labels: &[i64]) {
        self.embeddings.extend_from_slice(embeddings.data());
        self.labels.extend_from_slice(labels);

        let evicted = self.labels.len().saturating_sub(self.capacity);
        self.labels.drain(..evicted);
        self.embeddings.drain(..evicted * EMBEDDING_SIZE);
    }

    fn tensor(&self) -> Tensor {
        Tensor::from_vec(
            self.embeddings.clone(),
            &[self.labels.len(), EMBEDDING_SIZE],
        )
    }

    fn combined(&self, batch: &Tensor, labels: &[i64]) -> (Tensor, Vec<i64>) {
        let combined = Tensor::cat_rows(&[batch, &self.tensor()]);
        let combined_labels = labels.iter().chain(&self.labels).copied().collect();
        (combined, combined_labels)
    }
}

fn expected_loss(
    batch: &Tensor,
    labels: &[i64],
    history: &History,
    relations: &IndicesTuple,
) -> f32 {
    let (combined, combined_labels) = history.combined(batch, labels);
    ContrastiveLoss::default()
        .forward(&combined, &combined_labels, Some(relations))
        .expect("reference loss")
        .item()
}

fn check_losses_match(update_order: MemoryUpdate, memory_size: usize, steps: u64) {
    init_tracing();
    let inner_miner = MultiSimilarityMiner::new(0.3).expect("valid");
    let outer_miner = MultiSimilarityMiner::new(0.2).expect("valid");

    let mut plain = criterion_with_memory(update_order, memory_size);
    let mut with_miner = criterion_with_memory(update_order, memory_size).with_miner(inner_miner);
    let mut with_both = criterion_with_memory(update_order, memory_size).with_miner(inner_miner);
    let mut history = History::new(memory_size);

    for step in 0..steps {
        let embeddings = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(step));
        let labels = random_labels(BATCH_SIZE, 10, Some(1_000 + step));

        let loss = plain.forward(&embeddings, &labels, None).expect("forward");
        let loss_with_miner = with_miner
            .forward(&embeddings, &labels, None)
            .expect("forward");
        let outer = outer_miner.mine(&embeddings, &labels, None).expect("mine");
        let loss_with_both = with_both
            .forward(&embeddings, &labels, Some(&outer))
            .expect("forward");

        if update_order == MemoryUpdate::BeforeIndexing {
            history.push(&embeddings, &labels);
        }
        let memory = history.tensor();

        let all_pairs = IndicesTuple::Pairs(all_pairs_indices(&labels, Some(&history.labels)))
            .shift(BATCH_SIZE);
        assert_close(
            loss.item(),
            expected_loss(&embeddings, &labels, &history, &all_pairs),
        );

        let mined = inner_miner
            .mine(&embeddings, &labels, Some((&memory, &history.labels)))
            .expect("mine")
            .shift(BATCH_SIZE);
        assert_close(
            loss_with_miner.item(),
            expected_loss(&embeddings, &labels, &history, &mined),
        );

        let outer_first = outer.clone().concat(mined);
        assert_close(
            loss_with_both.item(),
            expected_loss(&embeddings, &labels, &history, &outer_first),
        );

        if update_order == MemoryUpdate::AfterLoss {
            history.push(&embeddings, &labels);
        }
    }

    let written = steps as usize * BATCH_SIZE;
    for criterion in [&plain, &with_miner, &with_both] {
        assert_eq!(criterion.queue_idx(), written % memory_size);
        assert_eq!(criterion.memory().is_filled(), written >= memory_size);
        assert_eq!(criterion.memory().len(), history.labels.len());
    }
}

#[test]
fn test_loss_against_prior_batches() {
    check_losses_match(MemoryUpdate::AfterLoss, MEMORY_SIZE, 10);
}

#[test]
fn test_loss_with_batch_appended_first() {
    check_losses_match(MemoryUpdate::BeforeIndexing, MEMORY_SIZE, 10);
}

#[test]
fn test_loss_after_memory_wraps() {
    // the eleventh batch of 32 runs past the end of 321 slots
    check_losses_match(MemoryUpdate::AfterLoss, MEMORY_SIZE, 12);
    check_losses_match(MemoryUpdate::BeforeIndexing, MEMORY_SIZE, 12);
}

#[test]
fn test_loss_with_small_rotating_memory() {
    // the third batch is split across the end; later steps read a rotated bank
    check_losses_match(MemoryUpdate::AfterLoss, 70, 7);
    check_losses_match(MemoryUpdate::BeforeIndexing, 70, 7);
}

#[test]
fn test_queue() {
    init_tracing();
    let mut criterion = new_criterion(MemoryUpdate::AfterLoss);
    let labels: Vec<i64> = (0..BATCH_SIZE as i64).collect();

    for step in 0..30 {
        let embeddings = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(step as u64));
        let start = criterion.queue_idx();
        assert_eq!(start, (step * BATCH_SIZE) % MEMORY_SIZE);

        criterion
            .forward(&embeddings, &labels, None)
            .expect("forward");

        let end = if start + BATCH_SIZE == MEMORY_SIZE {
            MEMORY_SIZE
        } else {
            (start + BATCH_SIZE) % MEMORY_SIZE
        };
        let (stored, stored_labels) = criterion
            .memory()
            .read_range(start, end)
            .expect("valid range");
        assert_eq!(stored, embeddings);
        assert_eq!(stored_labels, labels);
    }
    assert!(criterion.memory().is_filled());
}

#[test]
fn test_shift_indices_tuple() {
    let pair_miner = PairMarginMiner::new(0.0, 1.0).expect("valid");
    let triplet_miner = TripletMarginMiner::new(1.0).expect("valid");
    let mut criterion = new_criterion(MemoryUpdate::AfterLoss);
    let labels: Vec<i64> = (0..BATCH_SIZE as i64).collect();

    for step in 0..30u64 {
        let embeddings = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(step));
        criterion
            .forward(&embeddings, &labels, None)
            .expect("forward");

        let memory = criterion.memory().embedding_memory();
        let memory_labels = criterion.memory().label_memory().to_vec();
        let all_labels: Vec<i64> = labels.iter().chain(&memory_labels).copied().collect();

        let enumerated = IndicesTuple::Pairs(all_pairs_indices(&labels, Some(&memory_labels)));
        let pair_mined = pair_miner
            .mine(&embeddings, &labels, Some((&memory, &memory_labels)))
            .expect("mine");
        for tuple in [enumerated, pair_mined] {
            let original = tuple.clone().into_pairs();
            let shifted = tuple.shift(BATCH_SIZE).into_pairs();

            assert_eq!(shifted.a1, original.a1);
            assert_eq!(shifted.a2, original.a2);
            assert!(shifted.p.iter().zip(&original.p).all(|(&s, &o)| s == o + BATCH_SIZE));
            assert!(shifted.n.iter().zip(&original.n).all(|(&s, &o)| s == o + BATCH_SIZE));
            assert!(shifted
                .a1
                .iter()
                .zip(&shifted.p)
                .all(|(&a, &p)| all_labels[a] == all_labels[p]));
            assert!(shifted
                .a2
                .iter()
                .zip(&shifted.n)
                .all(|(&a, &n)| all_labels[a] != all_labels[n]));
        }

        let triplets = triplet_miner
            .mine(&embeddings, &labels, Some((&memory, &memory_labels)))
            .expect("mine");
        let original = triplets.clone().into_triplets();
        let shifted = triplets.shift(BATCH_SIZE).into_triplets();
        assert_eq!(shifted.a, original.a);
        assert!(shifted.p.iter().zip(&original.p).all(|(&s, &o)| s == o + BATCH_SIZE));
        assert!(shifted.n.iter().zip(&original.n).all(|(&s, &o)| s == o + BATCH_SIZE));
        for ((&a, &p), &n) in shifted.a.iter().zip(&shifted.p).zip(&shifted.n) {
            assert_eq!(all_labels[a], all_labels[p]);
            assert_ne!(all_labels[p], all_labels[n]);
        }
    }
}

#[test]
fn test_input_indices_tuple() {
    let pair_miner = PairMarginMiner::new(0.0, 1.0).expect("valid");
    let triplet_miner = TripletMarginMiner::new(1.0).expect("valid");
    let miners: [&dyn Miner; 2] = [&pair_miner, &triplet_miner];
    let mut criterion = new_criterion(MemoryUpdate::AfterLoss);
    let labels: Vec<i64> = (0..BATCH_SIZE as i64).collect();

    for step in 0..30u64 {
        let embeddings = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(step));
        criterion
            .forward(&embeddings, &labels, None)
            .expect("forward");

        let memory = criterion.memory().embedding_memory();
        let memory_labels = criterion.memory().label_memory().to_vec();
        let all_labels: Vec<i64> = labels.iter().chain(&memory_labels).copied().collect();

        for miner in miners {
            let input = miner.mine(&embeddings, &labels, None).expect("mine");
            let input_pairs = input.clone().into_pairs();
            let enumerated = all_pairs_indices(&labels, Some(&memory_labels));

            let combined = criterion
                .create_indices_tuple(&embeddings, &labels, &memory, &memory_labels, Some(&input))
                .expect("indices")
                .into_pairs();

            assert!(combined
                .a1
                .iter()
                .zip(&combined.p)
                .all(|(&a, &p)| all_labels[a] == all_labels[p]));
            assert!(combined
                .a2
                .iter()
                .zip(&combined.n)
                .all(|(&a, &n)| all_labels[a] != all_labels[n]));
            assert_eq!(combined.a1.len(), enumerated.a1.len() + input_pairs.a1.len());
            assert_eq!(combined.p.len(), enumerated.p.len() + input_pairs.p.len());
            assert_eq!(combined.a2.len(), enumerated.a2.len() + input_pairs.a2.len());
            assert_eq!(combined.n.len(), enumerated.n.len() + input_pairs.n.len());
        }
    }
}

fn check_gradient_stays_in_batch(update_order: MemoryUpdate) {
    clear_graph();
    let mut criterion = new_criterion(update_order);
    let warmup = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(7));
    let warmup_labels = random_labels(BATCH_SIZE, 4, Some(8));
    criterion
        .forward(&warmup, &warmup_labels, None)
        .expect("forward");

    let batch = randn(BATCH_SIZE, EMBEDDING_SIZE, Some(9)).requires_grad();
    let labels = random_labels(BATCH_SIZE, 4, Some(10));
    let mut scored = History::new(MEMORY_SIZE);
    if update_order == MemoryUpdate::AfterLoss {
        scored.push(&criterion.memory().embeddings(), criterion.memory().labels());
    }
    let loss = criterion.forward(&batch, &labels, None).expect("forward");
    if update_order == MemoryUpdate::BeforeIndexing {
        scored.push(&criterion.memory().embeddings(), criterion.memory().labels());
    }

    let stored = criterion.memory().embedding_memory();
    loss.backward();
    assert_eq!(criterion.memory().embedding_memory(), stored);

    let grad = get_grad(batch.id()).expect("batch gradient");
    assert_eq!(grad.shape(), &[BATCH_SIZE, EMBEDDING_SIZE]);
    assert!(grad.data().iter().all(|g| g.is_finite()));
    assert!(grad.data().iter().any(|&g| g != 0.0));

    // same relations with memory as a constant: any gradient routed through
    // the memory rows back into the batch would show up as a difference
    clear_graph();
    let reference = batch.detach().requires_grad();
    let relations = IndicesTuple::Pairs(all_pairs_indices(&labels, Some(&scored.labels)))
        .shift(BATCH_SIZE);
    let (combined, combined_labels) = scored.combined(&reference, &labels);
    ContrastiveLoss::default()
        .forward(&combined, &combined_labels, Some(&relations))
        .expect("reference loss")
        .backward();
    let expected = get_grad(reference.id()).expect("reference gradient");

    for (got, want) in grad.data().iter().zip(expected.data()) {
        assert!((got - want).abs() <= 1e-6, "gradient {got} differs from {want}");
    }
    clear_graph();
}

#[test]
fn test_gradients_flow_to_batch_not_memory() {
    check_gradient_stays_in_batch(MemoryUpdate::AfterLoss);
}

#[test]
fn test_gradients_skip_the_stored_copy_of_the_batch() {
    check_gradient_stays_in_batch(MemoryUpdate::BeforeIndexing);
}

#[test]
fn test_batch_larger_than_memory_is_rejected() {
    let mut criterion = CrossBatchMemory::new(
        ContrastiveLoss::default(),
        CrossBatchMemoryConfig::new(4, 8),
    )
    .expect("valid config");
    let embeddings = randn(9, 4, Some(11));
    let labels = random_labels(9, 2, Some(12));

    let err = criterion.forward(&embeddings, &labels, None).unwrap_err();
    assert!(matches!(err, MetricError::Configuration { .. }));
    assert!(err.to_string().contains("batch_size"));
}
