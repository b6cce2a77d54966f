//! Relation index tuples and the exhaustive relation enumerator.
//!
//! A relation tuple lists which embeddings a loss compares. Anchors index the
//! query set; positives and negatives index the reference set. When the
//! reference is the query set itself both live in the same index space.
//!
//! Two shapes exist:
//!
//! - pairs `(a1, p, a2, n)`: `a1[i]` vs `p[i]` is a positive relation,
//!   `a2[j]` vs `n[j]` a negative one
//! - triplets `(a, p, n)`: `a[i]` should be closer to `p[i]` than to `n[i]`
//!
//! # Example
//!
//! ```
//! use metriclearn::mining::indices::all_pairs_indices;
//!
//! let labels = [0, 0, 1];
//! let pairs = all_pairs_indices(&labels, None);
//! assert_eq!(pairs.a1, vec![0, 1]);
//! assert_eq!(pairs.p, vec![1, 0]);
//! assert_eq!(pairs.len_negative(), 4);
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{MetricError, Result};

/// Which form a relation tuple takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleKind {
    /// `(a1, p, a2, n)`
    Pairs,
    /// `(a, p, n)`
    Triplets,
}

/// Positive and negative pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairIndices {
    /// Anchors of the positive pairs
    pub a1: Vec<usize>,
    /// Positives, same label as the matching `a1`
    pub p: Vec<usize>,
    /// Anchors of the negative pairs
    pub a2: Vec<usize>,
    /// Negatives, different label from the matching `a2`
    pub n: Vec<usize>,
}

impl PairIndices {
    /// Build a pair tuple, checking `len(a1) == len(p)` and `len(a2) == len(n)`.
    pub fn new(a1: Vec<usize>, p: Vec<usize>, a2: Vec<usize>, n: Vec<usize>) -> Result<Self> {
        let pairs = Self { a1, p, a2, n };
        pairs.validate()?;
        Ok(pairs)
    }

    /// Check the field-length invariants.
    pub fn validate(&self) -> Result<()> {
        if self.a1.len() != self.p.len() {
            return Err(MetricError::invalid_indices(format!(
                "len(a1) = {} but len(p) = {}",
                self.a1.len(),
                self.p.len()
            )));
        }
        if self.a2.len() != self.n.len() {
            return Err(MetricError::invalid_indices(format!(
                "len(a2) = {} but len(n) = {}",
                self.a2.len(),
                self.n.len()
            )));
        }
        Ok(())
    }

    /// Number of positive pairs.
    #[must_use]
    pub fn len_positive(&self) -> usize {
        self.a1.len()
    }

    /// Number of negative pairs.
    #[must_use]
    pub fn len_negative(&self) -> usize {
        self.a2.len()
    }

    /// Add `offset` to `p` and `n`; anchors are untouched.
    #[must_use]
    pub fn shift(mut self, offset: usize) -> Self {
        self.p.iter_mut().for_each(|i| *i += offset);
        self.n.iter_mut().for_each(|i| *i += offset);
        self
    }

    /// Field-wise concatenation, `self` first.
    #[must_use]
    pub fn concat(mut self, other: PairIndices) -> Self {
        self.a1.extend(other.a1);
        self.p.extend(other.p);
        self.a2.extend(other.a2);
        self.n.extend(other.n);
        self
    }

    /// Every combination of an anchor's positives with its negatives.
    ///
    /// Anchors come out in ascending order; within an anchor, positives vary
    /// slowest. Anchors lacking either a positive or a negative produce nothing.
    #[must_use]
    pub fn to_triplets(&self) -> TripletIndices {
        let mut by_anchor: BTreeMap<usize, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
        for (&a, &p) in self.a1.iter().zip(&self.p) {
            by_anchor.entry(a).or_default().0.push(p);
        }
        for (&a, &n) in self.a2.iter().zip(&self.n) {
            by_anchor.entry(a).or_default().1.push(n);
        }

        let mut triplets = TripletIndices::default();
        for (anchor, (positives, negatives)) in by_anchor {
            for &p in &positives {
                for &n in &negatives {
                    triplets.a.push(anchor);
                    triplets.p.push(p);
                    triplets.n.push(n);
                }
            }
        }
        triplets
    }
}

/// Anchor-positive-negative triplets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripletIndices {
    /// Anchors
    pub a: Vec<usize>,
    /// Positives, same label as the anchor
    pub p: Vec<usize>,
    /// Negatives, different label from the anchor
    pub n: Vec<usize>,
}

impl TripletIndices {
    /// Build a triplet tuple, checking all three fields have equal length.
    pub fn new(a: Vec<usize>, p: Vec<usize>, n: Vec<usize>) -> Result<Self> {
        let triplets = Self { a, p, n };
        triplets.validate()?;
        Ok(triplets)
    }

    /// Check the field-length invariant.
    pub fn validate(&self) -> Result<()> {
        if self.a.len() != self.p.len() || self.a.len() != self.n.len() {
            return Err(MetricError::invalid_indices(format!(
                "triplet fields differ in length: a = {}, p = {}, n = {}",
                self.a.len(),
                self.p.len(),
                self.n.len()
            )));
        }
        Ok(())
    }

    /// Number of triplets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// True when there are no triplets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Add `offset` to `p` and `n`; anchors are untouched.
    #[must_use]
    pub fn shift(mut self, offset: usize) -> Self {
        self.p.iter_mut().for_each(|i| *i += offset);
        self.n.iter_mut().for_each(|i| *i += offset);
        self
    }

    /// Field-wise concatenation, `self` first.
    #[must_use]
    pub fn concat(mut self, other: TripletIndices) -> Self {
        self.a.extend(other.a);
        self.p.extend(other.p);
        self.n.extend(other.n);
        self
    }

    /// `(a, p, n)` becomes positive pair `(a, p)` and negative pair `(a, n)`.
    #[must_use]
    pub fn to_pairs(&self) -> PairIndices {
        PairIndices {
            a1: self.a.clone(),
            p: self.p.clone(),
            a2: self.a.clone(),
            n: self.n.clone(),
        }
    }
}

/// A relation tuple in either form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicesTuple {
    /// Pair form
    Pairs(PairIndices),
    /// Triplet form
    Triplets(TripletIndices),
}

impl IndicesTuple {
    /// Empty tuple of the given form.
    #[must_use]
    pub fn empty(kind: TupleKind) -> Self {
        match kind {
            TupleKind::Pairs => IndicesTuple::Pairs(PairIndices::default()),
            TupleKind::Triplets => IndicesTuple::Triplets(TripletIndices::default()),
        }
    }

    /// Which form this tuple takes.
    #[must_use]
    pub fn kind(&self) -> TupleKind {
        match self {
            IndicesTuple::Pairs(_) => TupleKind::Pairs,
            IndicesTuple::Triplets(_) => TupleKind::Triplets,
        }
    }

    /// Check the field-length invariants.
    pub fn validate(&self) -> Result<()> {
        match self {
            IndicesTuple::Pairs(pairs) => pairs.validate(),
            IndicesTuple::Triplets(triplets) => triplets.validate(),
        }
    }

    /// Check anchors are `< anchor_len` and every other index is `< ref_len`.
    pub fn check_bounds(&self, anchor_len: usize, ref_len: usize) -> Result<()> {
        fn check(field: &str, values: &[usize], limit: usize) -> Result<()> {
            match values.iter().find(|&&v| v >= limit) {
                Some(v) => Err(MetricError::invalid_indices(format!(
                    "{field} contains index {v}, expected < {limit}"
                ))),
                None => Ok(()),
            }
        }

        match self {
            IndicesTuple::Pairs(t) => {
                check("a1", &t.a1, anchor_len)?;
                check("p", &t.p, ref_len)?;
                check("a2", &t.a2, anchor_len)?;
                check("n", &t.n, ref_len)
            }
            IndicesTuple::Triplets(t) => {
                check("a", &t.a, anchor_len)?;
                check("p", &t.p, ref_len)?;
                check("n", &t.n, ref_len)
            }
        }
    }

    /// Number of positive relations (positive pairs, or triplets).
    #[must_use]
    pub fn len_positive(&self) -> usize {
        match self {
            IndicesTuple::Pairs(t) => t.len_positive(),
            IndicesTuple::Triplets(t) => t.len(),
        }
    }

    /// Number of negative relations (negative pairs, or triplets).
    #[must_use]
    pub fn len_negative(&self) -> usize {
        match self {
            IndicesTuple::Pairs(t) => t.len_negative(),
            IndicesTuple::Triplets(t) => t.len(),
        }
    }

    /// True when the tuple holds no relation at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len_positive() == 0 && self.len_negative() == 0
    }

    /// Move the reference-side indices into a concatenated `[query; reference]`
    /// space where the reference starts at `offset`.
    #[must_use]
    pub fn shift(self, offset: usize) -> Self {
        match self {
            IndicesTuple::Pairs(t) => IndicesTuple::Pairs(t.shift(offset)),
            IndicesTuple::Triplets(t) => IndicesTuple::Triplets(t.shift(offset)),
        }
    }

    /// Pair form of this tuple.
    #[must_use]
    pub fn into_pairs(self) -> PairIndices {
        match self {
            IndicesTuple::Pairs(t) => t,
            IndicesTuple::Triplets(t) => t.to_pairs(),
        }
    }

    /// Triplet form of this tuple.
    #[must_use]
    pub fn into_triplets(self) -> TripletIndices {
        match self {
            IndicesTuple::Pairs(t) => t.to_triplets(),
            IndicesTuple::Triplets(t) => t,
        }
    }

    /// Convert to the requested form (no-op when already in it).
    #[must_use]
    pub fn into_kind(self, kind: TupleKind) -> Self {
        match kind {
            TupleKind::Pairs => IndicesTuple::Pairs(self.into_pairs()),
            TupleKind::Triplets => IndicesTuple::Triplets(self.into_triplets()),
        }
    }

    /// Field-wise concatenation, `self` first.
    ///
    /// `other` is converted to the form of `self` when they differ.
    #[must_use]
    pub fn concat(self, other: IndicesTuple) -> Self {
        match self {
            IndicesTuple::Pairs(t) => IndicesTuple::Pairs(t.concat(other.into_pairs())),
            IndicesTuple::Triplets(t) => IndicesTuple::Triplets(t.concat(other.into_triplets())),
        }
    }
}

impl From<PairIndices> for IndicesTuple {
    fn from(pairs: PairIndices) -> Self {
        IndicesTuple::Pairs(pairs)
    }
}

impl From<TripletIndices> for IndicesTuple {
    fn from(triplets: TripletIndices) -> Self {
        IndicesTuple::Triplets(triplets)
    }
}

/// Every positive and negative pair between `labels` and `ref_labels`.
///
/// With `ref_labels = None` the reference is `labels` itself and the
/// self-pairs `(i, i)` are left out. Pairs are emitted row-major: anchor
/// ascending, then reference ascending.
#[must_use]
pub fn all_pairs_indices(labels: &[i64], ref_labels: Option<&[i64]>) -> PairIndices {
    let same_set = ref_labels.is_none();
    let reference = ref_labels.unwrap_or(labels);

    let mut pairs = PairIndices::default();
    for (i, &label) in labels.iter().enumerate() {
        for (j, &ref_label) in reference.iter().enumerate() {
            if same_set && i == j {
                continue;
            }
            if label == ref_label {
                pairs.a1.push(i);
                pairs.p.push(j);
            } else {
                pairs.a2.push(i);
                pairs.n.push(j);
            }
        }
    }
    pairs
}

/// Every `(a, p, n)` with `labels[a] == ref[p]` and `labels[a] != ref[n]`.
///
/// With `ref_labels = None` the reference is `labels` itself and `p == a`
/// is excluded. Output order: anchor, then positive, then negative ascending.
#[must_use]
pub fn all_triplets_indices(labels: &[i64], ref_labels: Option<&[i64]>) -> TripletIndices {
    let same_set = ref_labels.is_none();
    let reference = ref_labels.unwrap_or(labels);

    let mut triplets = TripletIndices::default();
    for (a, &label) in labels.iter().enumerate() {
        let positives = reference
            .iter()
            .enumerate()
            .filter(|&(j, &l)| l == label && !(same_set && j == a))
            .map(|(j, _)| j);
        for p in positives {
            for (n, _) in reference.iter().enumerate().filter(|&(_, &l)| l != label) {
                triplets.a.push(a);
                triplets.p.push(p);
                triplets.n.push(n);
            }
        }
    }
    triplets
}

#[cfg(test)]
#[path = "indices_tests.rs"]
mod tests;
