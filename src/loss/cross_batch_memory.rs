//! Cross-batch memory: relate each batch to embeddings from earlier batches.

use std::fmt;

use tracing::debug;

use super::config::{CrossBatchMemoryConfig, MemoryUpdate};
use super::MetricLoss;
use crate::autograd::Tensor;
use crate::error::Result;
use crate::memory::MemoryBank;
use crate::mining::indices::all_pairs_indices;
use crate::mining::{IndicesTuple, Miner, TupleKind};

/// Wraps a metric loss so every batch is also compared against a circular
/// memory of recent (detached) embeddings.
///
/// Each forward pass builds relations in the concatenated space
/// `[batch; memory]`: rows `0..B` are the current batch, rows `B..B+M` the
/// remembered embeddings. Anchors always come from the batch, so gradients
/// reach the batch and never the memory.
///
/// Relations against memory come from the inner miner when one is set
/// ([`CrossBatchMemory::with_miner`]), otherwise from every batch/memory pair.
/// A caller-supplied tuple over the batch alone is placed in front of them.
pub struct CrossBatchMemory {
    loss: Box<dyn MetricLoss>,
    miner: Option<Box<dyn Miner>>,
    memory: MemoryBank,
    config: CrossBatchMemoryConfig,
}

impl CrossBatchMemory {
    /// Create a cross-batch memory around `loss`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `config` has a zero size.
    pub fn new<L>(loss: L, config: CrossBatchMemoryConfig) -> Result<Self>
    where
        L: MetricLoss + 'static,
    {
        config.validate()?;
        let memory = MemoryBank::new(config.embedding_size, config.memory_size)?;
        Ok(Self {
            loss: Box::new(loss),
            miner: None,
            memory,
            config,
        })
    }

    /// Mine relations against memory with `miner` instead of taking all pairs.
    #[must_use]
    pub fn with_miner<M>(mut self, miner: M) -> Self
    where
        M: Miner + 'static,
    {
        self.miner = Some(Box::new(miner));
        self
    }

    /// The wrapped loss.
    #[must_use]
    pub fn loss(&self) -> &dyn MetricLoss {
        self.loss.as_ref()
    }

    /// The inner miner, if any.
    #[must_use]
    pub fn miner(&self) -> Option<&dyn Miner> {
        self.miner.as_deref()
    }

    /// The memory bank.
    #[must_use]
    pub fn memory(&self) -> &MemoryBank {
        &self.memory
    }

    /// Next memory slot to be written.
    #[must_use]
    pub fn queue_idx(&self) -> usize {
        self.memory.queue_idx()
    }

    /// The configuration this instance was built with.
    #[must_use]
    pub fn config(&self) -> &CrossBatchMemoryConfig {
        &self.config
    }

    /// Forget every remembered embedding.
    pub fn reset_memory(&mut self) {
        self.memory.reset();
        debug!(capacity = self.memory.capacity(), "cross-batch memory reset");
    }

    /// Build the relations for one batch in the `[batch; memory]` space.
    ///
    /// Relations between the batch and `memory_embeddings` come from the
    /// inner miner or from every labeled pair, and are shifted by the batch
    /// size so their reference indices land on the memory rows. The result
    /// takes the miner's [`Miner::output_kind`], or pairs without a miner.
    /// A tuple in `external` indexes the batch alone; it is converted to
    /// that form and comes first.
    ///
    /// # Errors
    ///
    /// `InvalidIndices` when `external` or the miner's output is malformed or
    /// out of range; any error raised by the miner.
    pub fn create_indices_tuple(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        memory_embeddings: &Tensor,
        memory_labels: &[i64],
        external: Option<&IndicesTuple>,
    ) -> Result<IndicesTuple> {
        let batch_size = labels.len();
        let kind = self
            .miner
            .as_ref()
            .map_or(TupleKind::Pairs, |miner| miner.output_kind());

        let against_memory = match &self.miner {
            Some(miner) => {
                let mined =
                    miner.mine(embeddings, labels, Some((memory_embeddings, memory_labels)))?;
                mined.validate()?;
                mined.check_bounds(batch_size, memory_labels.len())?;
                mined.into_kind(kind)
            }
            None => IndicesTuple::Pairs(all_pairs_indices(labels, Some(memory_labels))),
        };
        let against_memory = against_memory.shift(batch_size);

        let indices = match external {
            Some(tuple) => {
                tuple.validate()?;
                tuple.check_bounds(batch_size, batch_size)?;
                tuple
                    .clone()
                    .into_kind(kind)
                    .concat(against_memory)
            }
            None => against_memory,
        };

        indices.validate()?;
        Ok(indices)
    }

    /// Compute the wrapped loss for a batch against memory, and remember the
    /// batch.
    ///
    /// `indices` optionally adds relations within the batch (typically from
    /// an outer miner).
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for a batch of the wrong width or label count,
    /// `Configuration` for a batch larger than the memory, and any error
    /// from the miner or loss. The memory is left untouched when the batch or
    /// `indices` is rejected.
    pub fn forward(
        &mut self,
        embeddings: &Tensor,
        labels: &[i64],
        indices: Option<&IndicesTuple>,
    ) -> Result<Tensor> {
        self.memory.check_batch(embeddings, labels)?;
        let batch_size = labels.len();
        if let Some(tuple) = indices {
            tuple.validate()?;
            tuple.check_bounds(batch_size, batch_size)?;
        }

        let order = self.config.update_order;
        if order == MemoryUpdate::BeforeIndexing {
            self.memory.append(embeddings, labels)?;
        }

        let memory_embeddings = self.memory.embeddings();
        let memory_labels = self.memory.labels().to_vec();

        let tuple = self.create_indices_tuple(
            embeddings,
            labels,
            &memory_embeddings,
            &memory_labels,
            indices,
        )?;

        let combined = Tensor::cat_rows(&[embeddings, &memory_embeddings]);
        let combined_labels: Vec<i64> = labels.iter().chain(&memory_labels).copied().collect();
        let loss = self.loss.forward(&combined, &combined_labels, Some(&tuple))?;

        if order == MemoryUpdate::AfterLoss {
            self.memory.append(embeddings, labels)?;
        }

        debug!(
            loss = self.loss.name(),
            batch_size,
            memory_len = memory_labels.len(),
            positives = tuple.len_positive(),
            negatives = tuple.len_negative(),
            ?order,
            queue_idx = self.memory.queue_idx(),
            "cross-batch memory forward"
        );

        Ok(loss)
    }
}

impl fmt::Debug for CrossBatchMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossBatchMemory")
            .field("loss", &self.loss.name())
            .field("miner", &self.miner.as_ref().map(|m| m.name()))
            .field("memory_len", &self.memory.len())
            .field("queue_idx", &self.memory.queue_idx())
            .field("config", &self.config)
            .finish()
    }
}
