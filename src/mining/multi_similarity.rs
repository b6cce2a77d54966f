//! Multi-similarity pair mining (Wang et al., 2019).

use super::indices::{all_pairs_indices, IndicesTuple, PairIndices, TupleKind};
use super::{cosine_similarity_matrix, resolve_reference, Miner};
use crate::autograd::Tensor;
use crate::error::{MetricError, Result};

/// Mines hard pairs by comparing each anchor's positives against its
/// negatives in cosine similarity:
///
/// ```text
/// keep positive (i, j)  if  s(i, j) - ε < max_{n ∈ neg(i)} s(i, n)
/// keep negative (i, j)  if  s(i, j) + ε > min_{p ∈ pos(i)} s(i, p)
/// ```
///
/// An anchor with no negatives keeps no positives and vice versa.
#[derive(Debug, Clone, Copy)]
pub struct MultiSimilarityMiner {
    epsilon: f32,
}

impl MultiSimilarityMiner {
    /// Creates a multi-similarity miner with margin `epsilon`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `epsilon` is not finite.
    pub fn new(epsilon: f32) -> Result<Self> {
        if !epsilon.is_finite() {
            return Err(MetricError::configuration("epsilon", epsilon, "a finite value"));
        }
        Ok(Self { epsilon })
    }

    /// Returns the similarity margin.
    #[must_use]
    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }
}

impl Default for MultiSimilarityMiner {
    fn default() -> Self {
        Self { epsilon: 0.1 }
    }
}

impl Miner for MultiSimilarityMiner {
    fn mine(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        reference: Option<(&Tensor, &[i64])>,
    ) -> Result<IndicesTuple> {
        let (ref_embeddings, ref_labels, same_set) =
            resolve_reference(embeddings, labels, reference)?;

        let all = all_pairs_indices(labels, (!same_set).then_some(ref_labels));
        if all.len_positive() == 0 || all.len_negative() == 0 {
            return Ok(IndicesTuple::Pairs(PairIndices::default()));
        }

        let sim = cosine_similarity_matrix(embeddings, ref_embeddings);
        let cols = ref_embeddings.rows();

        let rows = labels.len();
        let mut hardest_neg = vec![f32::NEG_INFINITY; rows];
        let mut easiest_pos = vec![f32::INFINITY; rows];
        for (&a, &n) in all.a2.iter().zip(&all.n) {
            hardest_neg[a] = hardest_neg[a].max(sim[a * cols + n]);
        }
        for (&a, &p) in all.a1.iter().zip(&all.p) {
            easiest_pos[a] = easiest_pos[a].min(sim[a * cols + p]);
        }

        let mut mined = PairIndices::default();
        for (&a, &p) in all.a1.iter().zip(&all.p) {
            if sim[a * cols + p] - self.epsilon < hardest_neg[a] {
                mined.a1.push(a);
                mined.p.push(p);
            }
        }
        for (&a, &n) in all.a2.iter().zip(&all.n) {
            if sim[a * cols + n] + self.epsilon > easiest_pos[a] {
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
        "MultiSimilarityMiner"
    }
}
