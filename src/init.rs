//! Random tensors and labels for training loops, demos and tests.
//!
//! Every function takes an optional seed; `None` draws from entropy.

use crate::autograd::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Samples a tensor from N(mean, std) with the Box-Muller transform.
#[must_use]
pub fn normal(shape: &[usize], mean: f32, std: f32, seed: Option<u64>) -> Tensor {
    let numel: usize = shape.iter().product();
    let mut rng = rng_from(seed);

    let data: Vec<f32> = (0..numel)
        .map(|_| {
            let u1: f32 = rng.gen_range(0.0001_f32..1.0_f32);
            let u2: f32 = rng.gen_range(0.0_f32..1.0_f32);
            let z = (-2.0_f32 * u1.ln()).sqrt() * (2.0_f32 * std::f32::consts::PI * u2).cos();
            mean + std * z
        })
        .collect();

    Tensor::from_vec(data, shape)
}

/// Standard normal embeddings of shape `[rows, dim]`.
#[must_use]
pub fn randn(rows: usize, dim: usize, seed: Option<u64>) -> Tensor {
    normal(&[rows, dim], 0.0, 1.0, seed)
}

/// `n` class labels drawn uniformly from `0..num_classes`.
///
/// # Panics
///
/// Panics if `num_classes` is zero.
#[must_use]
pub fn random_labels(n: usize, num_classes: i64, seed: Option<u64>) -> Vec<i64> {
    assert!(num_classes > 0, "num_classes must be positive");
    let mut rng = rng_from(seed);
    (0..n).map(|_| rng.gen_range(0..num_classes)).collect()
}
