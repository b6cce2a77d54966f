//! Metric-learning losses over labeled embedding batches.
//!
//! A metric loss scores a batch of embeddings by the relations between them:
//! pairs or triplets that share (positive) or do not share (negative) a label.
//! Relations come either from a miner, as an [`IndicesTuple`], or from the
//! loss itself enumerating every relation in the batch.
//!
//! [`CrossBatchMemory`] wraps any [`MetricLoss`] and extends each batch's
//! relations to embeddings remembered from earlier batches.
//!
//! # Example
//!
//! ```
//! use metriclearn::autograd::{get_grad, Tensor};
//! use metriclearn::loss::{ContrastiveLoss, CrossBatchMemory, CrossBatchMemoryConfig};
//!
//! let config = CrossBatchMemoryConfig::new(2, 8);
//! let mut criterion = CrossBatchMemory::new(ContrastiveLoss::default(), config).unwrap();
//!
//! let batch = Tensor::new(&[0.0, 0.0, 0.3, 0.4, 2.0, 0.0], &[3, 2]).requires_grad();
//! let labels = [0, 0, 1];
//!
//! // The first batch only fills the memory: there is nothing to relate it to yet
//! let first = criterion.forward(&batch, &labels, None).unwrap();
//! assert_eq!(first.item(), 0.0);
//!
//! // Later batches are scored against everything remembered so far
//! let loss = criterion.forward(&batch, &labels, None).unwrap();
//! loss.backward();
//!
//! assert!(loss.item() > 0.0);
//! assert!(get_grad(batch.id()).is_some());
//! assert_eq!(criterion.queue_idx(), 6);
//! ```
//!
//! # References
//!
//! - Hadsell, R., Chopra, S., & LeCun, Y. (2006). Dimensionality Reduction by
//!   Learning an Invariant Mapping. CVPR.
//! - Wang, X., Zhang, H., Huang, W., & Scott, M. R. (2020). Cross-Batch Memory
//!   for Embedding Learning. CVPR.

mod config;
mod contrastive;
mod cross_batch_memory;

pub use config::{CrossBatchMemoryConfig, MemoryUpdate};
pub use contrastive::ContrastiveLoss;
pub use cross_batch_memory::CrossBatchMemory;

use crate::autograd::Tensor;
use crate::error::Result;
use crate::mining::IndicesTuple;

/// Trait for losses defined over labeled embeddings.
///
/// Tuples passed in `indices` index rows of `embeddings` in every field.
/// With `indices = None` the loss builds its own relations from `labels`.
pub trait MetricLoss {
    /// Compute the scalar loss, differentiable with respect to `embeddings`.
    fn forward(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        indices: Option<&IndicesTuple>,
    ) -> Result<Tensor>;

    /// Returns the name of the loss.
    fn name(&self) -> &'static str;
}

impl<L: MetricLoss + ?Sized> MetricLoss for Box<L> {
    fn forward(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        indices: Option<&IndicesTuple>,
    ) -> Result<Tensor> {
        (**self).forward(embeddings, labels, indices)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}
