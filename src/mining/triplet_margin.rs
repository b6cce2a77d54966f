//! Margin-violating triplet mining.

use super::indices::{all_triplets_indices, IndicesTuple, TripletIndices, TupleKind};
use super::{distance_matrix, resolve_reference, Miner};
use crate::autograd::Tensor;
use crate::error::{MetricError, Result};

/// Keeps triplets whose negative is not at least `margin` farther from the
/// anchor than the positive: `d(a, n) - d(a, p) <= margin`.
#[derive(Debug, Clone, Copy)]
pub struct TripletMarginMiner {
    margin: f32,
}

impl TripletMarginMiner {
    /// Creates a triplet-margin miner.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `margin` is not finite.
    pub fn new(margin: f32) -> Result<Self> {
        if !margin.is_finite() {
            return Err(MetricError::configuration("margin", margin, "a finite value"));
        }
        Ok(Self { margin })
    }

    /// Returns the margin.
    #[must_use]
    pub fn margin(&self) -> f32 {
        self.margin
    }
}

impl Default for TripletMarginMiner {
    fn default() -> Self {
        Self { margin: 0.2 }
    }
}

impl Miner for TripletMarginMiner {
    fn mine(
        &self,
        embeddings: &Tensor,
        labels: &[i64],
        reference: Option<(&Tensor, &[i64])>,
    ) -> Result<IndicesTuple> {
        let (ref_embeddings, ref_labels, same_set) =
            resolve_reference(embeddings, labels, reference)?;

        let all = all_triplets_indices(labels, (!same_set).then_some(ref_labels));
        let dist = distance_matrix(embeddings, ref_embeddings);
        let cols = ref_embeddings.rows();

        let mut mined = TripletIndices::default();
        for ((&a, &p), &n) in all.a.iter().zip(&all.p).zip(&all.n) {
            let violation = dist[a * cols + n] - dist[a * cols + p];
            if violation <= self.margin {
                mined.a.push(a);
                mined.p.push(p);
                mined.n.push(n);
            }
        }

        Ok(IndicesTuple::Triplets(mined))
    }

    fn output_kind(&self) -> TupleKind {
        TupleKind::Triplets
    }

    fn name(&self) -> &'static str {
        "TripletMarginMiner"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_violating_triplets() {
        // anchor 0 at origin; positive 1 at distance 1; negatives 2 (d=1.5) and 3 (d=5)
        let e = Tensor::new(&[0.0, 0.0, 1.0, 0.0, 0.0, 1.5, 5.0, 0.0], &[4, 2]);
        let labels = [0, 0, 1, 2];
        let miner = TripletMarginMiner::new(1.0).expect("valid");
        let t = miner.mine(&e, &labels, None).expect("mine").into_triplets();

        // (0,1,2): 1.5 - 1 = 0.5 <= 1 kept; (0,1,3): 5 - 1 = 4 dropped
        // (1,0,2): d(1,2)=1.80 - 1 = 0.80 kept; (1,0,3): 4 - 1 = 3 dropped
        assert_eq!(t.a, vec![0, 1]);
        assert_eq!(t.p, vec![1, 0]);
        assert_eq!(t.n, vec![2, 2]);
    }

    #[test]
    fn test_reference_triplets_index_reference() {
        let e = Tensor::new(&[0.0, 0.0], &[1, 2]);
        let r = Tensor::new(&[0.1, 0.0, 0.2, 0.0, 9.0, 9.0], &[3, 2]);
        let miner = TripletMarginMiner::new(1.0).expect("valid");
        let t = miner
            .mine(&e, &[7], Some((&r, &[7, 8, 8])))
            .expect("mine")
            .into_triplets();

        // (0, 0, 1): 0.2 - 0.1 kept; (0, 0, 2): 12.7 - 0.1 dropped
        assert_eq!(t.a, vec![0]);
        assert_eq!(t.p, vec![0]);
        assert_eq!(t.n, vec![1]);
    }

    #[test]
    fn test_rejects_non_finite_margin() {
        assert!(TripletMarginMiner::new(f32::INFINITY).is_err());
        assert_eq!(TripletMarginMiner::default().margin(), 0.2);
        assert_eq!(TripletMarginMiner::default().output_kind(), TupleKind::Triplets);
    }
}
