//! Margin-based pair mining.

use super::indices::{all_pairs_indices, IndicesTuple, PairIndices, TupleKind};
use super::{distance_matrix, resolve_reference, Miner};
use crate::autograd::Tensor;
use crate::error::{MetricError, Result};

/// Keeps positive pairs farther apart than `pos_margin` and negative pairs
/// closer than `neg_margin` (Euclidean distance).
///
/// With `pos_margin = 0` and `neg_margin = 1` this returns exactly the pairs a
/// [`ContrastiveLoss`](crate::loss::ContrastiveLoss) with the same margins
/// would penalize.
#[derive(Debug, Clone, Copy)]
pub struct PairMarginMiner {
    pos_margin: f32,
    neg_margin: f32,
}

impl PairMarginMiner {
    /// Creates a pair-margin miner.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a margin is negative or not finite.
    pub fn new(pos_margin: f32, neg_margin: f32) -> Result<Self> {
        for (param, value) in [("pos_margin", pos_margin), ("neg_margin", neg_margin)] {
            if !value.is_finite() || value < 0.0 {
                return Err(MetricError::configuration(param, value, "finite and >= 0"));
            }
        }
        Ok(Self {
            pos_margin,
            neg_margin,
        })
    }

    /// Returns the positive margin.
    #[must_use]
    pub fn pos_margin(&self) -> f32 {
        self.pos_margin
    }

    /// Returns the negative margin.
    #[must_use]
    pub fn neg_margin(&self) -> f32 {
        self.neg_margin
    }
}

impl Default for PairMarginMiner {
    fn default() -> Self {
        Self {
            pos_margin: 0.2,
            neg_margin: 0.8,
        }
    }
}

impl Miner for PairMarginMiner {
    fn mine(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        reference: Option<(&Tensor, &[i64])>,
    ) -> Result<IndicesTuple> {
        let (ref_embeddings, ref_labels, same_set) =
            resolve_reference(embeddings, labels, reference)?;

        let all = all_pairs_indices(labels, (!same_set).then_some(ref_labels));
        let dist = distance_matrix(embeddings, ref_embeddings);
        let cols = ref_embeddings.rows();

        let mut mined = PairIndices::default();
        for (&a, &p) in all.a1.iter().zip(&all.p) {
            if dist[a * cols + p] > self.pos_margin {
                mined.a1.push(a);
                mined.p.push(p);
            }
        }
        for (&a, &n) in all.a2.iter().zip(&all.n) {
            if dist[a * cols + n] < self.neg_margin {
                mined.a2.push(a);
                mined.n.push(n);
            }
        }

        Ok(IndicesTuple::Pairs(mined))
    }

    fn output_kind(&self) -> TupleKind {
        TupleKind::Pairs
    }

    fn name(&self) -> &'static str {
        "PairMarginMiner"
    }
}
