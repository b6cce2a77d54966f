//! Differentiable operations for tensors.
//!
//! Each operation:
//! 1. Computes the forward result
//! 2. Records a `GradFn` to the computation graph (if gradient tracking is
//!    enabled and any input requires grad)
//!
//! Matmul runs on trueno's SIMD kernel.

use std::sync::Arc;

use super::grad_fn::{
    AddBackward, AddScalarBackward, CatRowsBackward, GradFn, IndexSelectBackward, MatmulBackward,
    MeanBackward, NegBackward, PowBackward, ReluBackward, SqrtBackward, SubBackward, SumBackward,
    SumRowsBackward, TransposeBackward,
};
use super::tensor::Tensor;
use super::{is_grad_enabled, with_graph};

/// Attach `grad_fn` to `result` and record it on the tape when any input
/// participates in gradient computation.
fn track(result: &mut Tensor, inputs: &[&Tensor], grad_fn: impl FnOnce() -> Arc<dyn GradFn>) {
    if !is_grad_enabled() || !inputs.iter().any(|t| t.requires_grad_enabled()) {
        return;
    }

    let grad_fn = grad_fn();
    result.set_grad_fn(grad_fn.clone());

    with_graph(|graph| {
        for input in inputs {
            graph.register_tensor((*input).clone());
        }
        graph.record(
            result.id(),
            grad_fn,
            inputs.iter().map(|t| t.id()).collect(),
        );
    });
}

fn assert_same_shape(op: &str, a: &Tensor, b: &Tensor) {
    assert_eq!(
        a.shape(),
        b.shape(),
        "{op} requires equal shapes, got {:?} and {:?}",
        a.shape(),
        b.shape()
    );
}

// ============================================================================
// Element-wise Operations
// ============================================================================

impl Tensor {
    /// Element-wise addition: z = self + other
    #[must_use]
    pub fn add(&self, other: &Tensor) -> Tensor {
        assert_same_shape("add", self, other);
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a + b)
            .collect();

        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self, other], || Arc::new(AddBackward));
        result
    }

    /// Element-wise subtraction: z = self - other
    #[must_use]
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_same_shape("sub", self, other);
        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| a - b)
            .collect();

        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self, other], || Arc::new(SubBackward));
        result
    }

    /// Element-wise negation: z = -self
    #[must_use]
    pub fn neg(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| -a).collect();
        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self], || Arc::new(NegBackward));
        result
    }

    /// Scalar addition: z = self + scalar
    #[must_use]
    pub fn add_scalar(&self, scalar: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a + scalar).collect();
        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self], || Arc::new(AddScalarBackward));
        result
    }

    /// Element-wise power: z = self^n
    #[must_use]
    pub fn pow(&self, n: f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.powf(n)).collect();
        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self], || {
            Arc::new(PowBackward { x: self.clone(), n })
        });
        result
    }

    /// Element-wise square root: z = sqrt(self)
    #[must_use]
    pub fn sqrt(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.sqrt()).collect();
        let mut result = Tensor::from_vec(data, self.shape());
        let output = result.clone();
        track(&mut result, &[self], || Arc::new(SqrtBackward { output }));
        result
    }

    /// `ReLU` activation: z = max(0, self)
    #[must_use]
    pub fn relu(&self) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| a.max(0.0)).collect();
        let mut result = Tensor::from_vec(data, self.shape());
        track(&mut result, &[self], || Arc::new(ReluBackward { x: self.clone() }));
        result
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

impl Tensor {
    /// Sum all elements: z = sum(self)
    #[must_use]
    pub fn sum(&self) -> Tensor {
        let sum: f32 = self.data().iter().sum();
        let mut result = Tensor::from_vec(vec![sum], &[1]);
        track(&mut result, &[self], || {
            Arc::new(SumBackward {
                input_shape: self.shape().to_vec(),
            })
        });
        result
    }

    /// Mean of all elements: z = mean(self)
    ///
    /// The mean of an empty tensor is NaN; callers reducing a possibly empty
    /// set of relations check for emptiness first.
    #[must_use]
    pub fn mean(&self) -> Tensor {
        let sum: f32 = self.data().iter().sum();
        let mean = sum / self.numel() as f32;
        let mut result = Tensor::from_vec(vec![mean], &[1]);
        track(&mut result, &[self], || {
            Arc::new(MeanBackward {
                input_shape: self.shape().to_vec(),
            })
        });
        result
    }

    /// Sum over the last dimension of a 2D tensor: `[N, D] -> [N]`.
    #[must_use]
    pub fn sum_rows(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "sum_rows requires a 2D tensor");
        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let data: Vec<f32> = (0..rows).map(|i| self.row(i).iter().sum()).collect();

        let mut result = Tensor::from_vec(data, &[rows]);
        track(&mut result, &[self], || {
            Arc::new(SumRowsBackward { rows, cols })
        });
        result
    }
}

// ============================================================================
// Linear Algebra
// ============================================================================

impl Tensor {
    /// Matrix multiplication: z = self @ other (2D only).
    ///
    /// # Panics
    ///
    /// Panics if either operand is not 2D or the inner dimensions differ.
    #[must_use]
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");

        let (m, k1) = (self.shape()[0], self.shape()[1]);
        let (k2, n) = (other.shape()[0], other.shape()[1]);
        assert_eq!(k1, k2, "matmul dimension mismatch: {k1} vs {k2}");

        let data = if m == 0 || n == 0 || k1 == 0 {
            vec![0.0; m * n]
        } else {
            let a_matrix = trueno::Matrix::from_vec(m, k1, self.data().to_vec())
                .expect("valid matrix dimensions");
            let b_matrix = trueno::Matrix::from_vec(k2, n, other.data().to_vec())
                .expect("valid matrix dimensions");
            let result_matrix = a_matrix.matmul(&b_matrix).expect("matmul should succeed");
            result_matrix.as_slice().to_vec()
        };

        let mut result = Tensor::from_vec(data, &[m, n]);
        track(&mut result, &[self, other], || {
            Arc::new(MatmulBackward {
                x: self.clone(),
                y: other.clone(),
            })
        });
        result
    }

    /// Transpose a 2D tensor.
    #[must_use]
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");

        let (rows, cols) = (self.shape()[0], self.shape()[1]);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = self.data()[i * cols + j];
            }
        }

        let mut result = Tensor::from_vec(data, &[cols, rows]);
        track(&mut result, &[self], || Arc::new(TransposeBackward));
        result
    }
}

// ============================================================================
// Indexing
// ============================================================================

impl Tensor {
    /// Gather rows: `z[i] = self[indices[i]]`.
    ///
    /// Works on any tensor with at least one dimension; a row is everything
    /// after the first dimension.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range.
    #[must_use]
    pub fn index_select(&self, indices: &[usize]) -> Tensor {
        assert!(self.ndim() >= 1, "index_select requires at least 1 dimension");
        let rows = self.rows();
        let width = self.row_len();

        let mut data = Vec::with_capacity(indices.len() * width);
        for &i in indices {
            assert!(i < rows, "index_select: index {i} out of range for {rows} rows");
            data.extend_from_slice(&self.data()[i * width..(i + 1) * width]);
        }

        let mut shape = self.shape().to_vec();
        shape[0] = indices.len();

        let mut result = Tensor::from_vec(data, &shape);
        track(&mut result, &[self], || {
            Arc::new(IndexSelectBackward {
                input_shape: self.shape().to_vec(),
                indices: indices.to_vec(),
            })
        });
        result
    }

    /// Concatenate tensors along the first dimension.
    ///
    /// # Panics
    ///
    /// Panics if `parts` is empty or the trailing dimensions differ.
    #[must_use]
    pub fn cat_rows(parts: &[&Tensor]) -> Tensor {
        assert!(!parts.is_empty(), "cat_rows requires at least one tensor");
        let trailing = &parts[0].shape()[1..];
        for part in parts {
            assert_eq!(
                &part.shape()[1..],
                trailing,
                "cat_rows requires matching trailing dimensions"
            );
        }

        let rows: usize = parts.iter().map(|t| t.rows()).sum();
        let mut data = Vec::with_capacity(parts.iter().map(|t| t.numel()).sum());
        for part in parts {
            data.extend_from_slice(part.data());
        }

        let mut shape = parts[0].shape().to_vec();
        shape[0] = rows;

        let mut result = Tensor::from_vec(data, &shape);
        track(&mut result, parts, || {
            Arc::new(CatRowsBackward {
                input_shapes: parts.iter().map(|t| t.shape().to_vec()).collect(),
            })
        });
        result
    }
}
