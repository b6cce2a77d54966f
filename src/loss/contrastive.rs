//! Contrastive (pair margin) loss.

use super::MetricLoss;
use crate::autograd::Tensor;
use crate::error::{MetricError, Result};
use crate::mining::check_embeddings;
use crate::mining::indices::all_pairs_indices;
use crate::mining::IndicesTuple;

/// Keeps the distance inside a pair differentiable at zero.
const DISTANCE_EPS: f32 = 1e-12;

/// Contrastive loss over positive and negative pairs.
///
/// ```text
/// L = mean_{(a,p)} relu(d(a, p) - m_pos) + mean_{(a,n)} relu(m_neg - d(a, n))
/// ```
///
/// `d` is the Euclidean distance. A side with no pairs contributes nothing;
/// with no pairs at all the loss is `0`. Triplets are split into their
/// positive and negative pairs.
#[derive(Debug, Clone, Copy)]
pub struct ContrastiveLoss {
    pos_margin: f32,
    neg_margin: f32,
}

impl ContrastiveLoss {
    /// Create a contrastive loss with the given margins.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a margin is not finite.
    pub fn new(pos_margin: f32, neg_margin: f32) -> Result<Self> {
        for (param, value) in [("pos_margin", pos_margin), ("neg_margin", neg_margin)] {
            if !value.is_finite() {
                return Err(MetricError::configuration(param, value, "a finite value"));
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

    /// Euclidean distance per pair, shape `[k]`.
    fn pair_distances(embeddings: &Tensor, left: &[usize], right: &[usize]) -> Tensor {
        let diff = embeddings
            .index_select(left)
            .sub(&embeddings.index_select(right));
        diff.pow(2.0).sum_rows().add_scalar(DISTANCE_EPS).sqrt()
    }
}

impl Default for ContrastiveLoss {
    fn default() -> Self {
        Self {
            pos_margin: 0.0,
            neg_margin: 1.0,
        }
    }
}

impl MetricLoss for ContrastiveLoss {
    fn forward(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        indices: Option<&IndicesTuple>,
    ) -> Result<Tensor> {
        check_embeddings(embeddings, labels)?;

        let pairs = match indices {
            None => all_pairs_indices(labels, None),
            Some(tuple) => {
                tuple.validate()?;
                tuple.check_bounds(labels.len(), labels.len())?;
                tuple.clone().into_pairs()
            }
        };

        let mut terms = Vec::with_capacity(2);
        if pairs.len_positive() > 0 {
            let d = Self::pair_distances(embeddings, &pairs.a1, &pairs.p);
            terms.push(d.add_scalar(-self.pos_margin).relu().mean());
        }
        if pairs.len_negative() > 0 {
            let d = Self::pair_distances(embeddings, &pairs.a2, &pairs.n);
            terms.push(d.neg().add_scalar(self.neg_margin).relu().mean());
        }

        let loss = match terms.as_slice() {
            [] => Tensor::zeros(&[1]),
            [single] => single.clone(),
            [pos, neg, ..] => pos.add(neg),
        };
        Ok(loss)
    }

    fn name(&self) -> &'static str {
        "ContrastiveLoss"
    }
}
