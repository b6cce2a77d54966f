//! Miners: pick the informative relations out of all possible ones.
//!
//! A miner looks at a batch of embeddings (and optionally a reference set such
//! as a memory bank) and returns the pairs or triplets worth training on.
//! Miners never contribute to gradients; everything here runs under
//! [`no_grad`].
//!
//! # Miners
//!
//! - [`PairMarginMiner`]: positives farther than a margin, negatives closer than one
//! - [`TripletMarginMiner`]: triplets that violate a distance margin
//! - [`MultiSimilarityMiner`]: hard pairs by cosine similarity (Wang et al., 2019)
//!
//! # Example
//!
//! ```
//! use metriclearn::autograd::Tensor;
//! use metriclearn::mining::{Miner, PairMarginMiner};
//!
//! let embeddings = Tensor::new(&[0.0, 0.0, 3.0, 0.0, 0.0, 0.1], &[3, 2]);
//! let labels = [0, 0, 1];
//!
//! let miner = PairMarginMiner::new(0.5, 1.0).unwrap();
//! let pairs = miner.mine(&embeddings, &labels, None).unwrap().into_pairs();
//!
//! // 0 and 1 share a label but are 3.0 apart: a hard positive
//! assert_eq!(pairs.a1, vec![0, 1]);
//! // 0 and 2 differ but are only 0.1 apart: a hard negative
//! assert_eq!(pairs.a2, vec![0, 2]);
//! ```
//!
//! # References
//!
//! - Wang, X., et al. (2019). Multi-Similarity Loss with General Pair Weighting
//!   for Deep Metric Learning. CVPR.

pub mod indices;
mod multi_similarity;
mod pair_margin;
mod triplet_margin;

pub use indices::{IndicesTuple, PairIndices, TripletIndices, TupleKind};
pub use multi_similarity::MultiSimilarityMiner;
pub use pair_margin::PairMarginMiner;
pub use triplet_margin::TripletMarginMiner;

use crate::autograd::{no_grad, Tensor};
use crate::error::{MetricError, Result};

/// Trait for relation miners.
///
/// With `reference = None` the miner relates the batch to itself and skips
/// self-relations. With a reference set, anchors index `embeddings` and
/// positives/negatives index the reference.
pub trait Miner {
    /// Mine relations between `embeddings` and `reference` (or itself).
    fn mine(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        reference: Option<(&Tensor, &[i64])>,
    ) -> Result<IndicesTuple>;

    /// Form of the tuples this miner returns. Relations built around the
    /// miner's output, such as a cross-batch memory's, take this form.
    fn output_kind(&self) -> TupleKind;

    /// Returns the name of the miner.
    fn name(&self) -> &'static str;
}

/// Check an embedding matrix against its labels.
pub(crate) fn check_embeddings(embeddings: &Tensor, labels: &[i64]) -> Result<()> {
    if embeddings.ndim() != 2 {
        return Err(MetricError::shape_mismatch(
            "2D embeddings [batch, dim]",
            format!("{:?}", embeddings.shape()),
        ));
    }
    if embeddings.rows() != labels.len() {
        return Err(MetricError::shape_mismatch(
            format!("{} labels", embeddings.rows()),
            format!("{} labels", labels.len()),
        ));
    }
    Ok(())
}

/// Validate miner inputs and resolve the reference set.
///
/// Returns `(reference_embeddings, reference_labels, same_set)`.
pub(crate) fn resolve_reference<'a>(
    embeddings: &'a Tensor,
    labels: &'a [i64],
    reference: Option<(&'a Tensor, &'a [i64])>,
) -> Result<(&'a Tensor, &'a [i64], bool)> {
    check_embeddings(embeddings, labels)?;
    match reference {
        None => Ok((embeddings, labels, true)),
        Some((ref_embeddings, ref_labels)) => {
            check_embeddings(ref_embeddings, ref_labels)?;
            if ref_embeddings.row_len() != embeddings.row_len() {
                return Err(MetricError::shape_mismatch(
                    format!("reference width {}", embeddings.row_len()),
                    format!("reference width {}", ref_embeddings.row_len()),
                ));
            }
            Ok((ref_embeddings, ref_labels, false))
        }
    }
}

/// Row-major Euclidean distance matrix `[a.rows, b.rows]`.
pub(crate) fn distance_matrix(a: &Tensor, b: &Tensor) -> Vec<f32> {
    no_grad(|| {
        let dots = a.matmul(&b.transpose());
        let a_sq: Vec<f32> = (0..a.rows()).map(|i| squared_norm(a.row(i))).collect();
        let b_sq: Vec<f32> = (0..b.rows()).map(|j| squared_norm(b.row(j))).collect();

        let cols = b.rows();
        dots.data()
            .iter()
            .enumerate()
            .map(|(k, &dot)| {
                let (i, j) = (k / cols, k % cols);
                (a_sq[i] + b_sq[j] - 2.0 * dot).max(0.0).sqrt()
            })
            .collect()
    })
}

/// Row-major cosine similarity matrix `[a.rows, b.rows]`.
pub(crate) fn cosine_similarity_matrix(a: &Tensor, b: &Tensor) -> Vec<f32> {
    no_grad(|| {
        let a_norm = l2_normalize_rows(a);
        let b_norm = l2_normalize_rows(b);
        a_norm.matmul(&b_norm.transpose()).data().to_vec()
    })
}

fn squared_norm(row: &[f32]) -> f32 {
    row.iter().map(|v| v * v).sum()
}

fn l2_normalize_rows(t: &Tensor) -> Tensor {
    let mut data = Vec::with_capacity(t.numel());
    for i in 0..t.rows() {
        let row = t.row(i);
        let norm = squared_norm(row).sqrt().max(1e-12);
        data.extend(row.iter().map(|v| v / norm));
    }
    Tensor::from_vec(data, t.shape())
}
