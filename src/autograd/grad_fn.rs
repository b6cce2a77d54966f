//! Gradient function trait and implementations.
//!
//! Each differentiable operation implements `GradFn` to define
//! how gradients flow backward through the operation.

use super::tensor::Tensor;

/// Trait for functions that compute gradients during backward pass.
///
/// Each differentiable operation creates a `GradFn` implementation
/// that captures the context it needs for gradient computation.
///
/// For element-wise addition z = x + y:
/// - ∂z/∂x = 1
/// - ∂z/∂y = 1
///
/// So `backward(grad_output)` returns [`grad_output`, `grad_output`].
pub trait GradFn: Send + Sync {
    /// Compute gradients with respect to inputs.
    ///
    /// Returns one gradient per input tensor, in the input order used
    /// during the forward pass.
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor>;

    /// Human-readable name for debugging.
    fn name(&self) -> &'static str;
}

fn map_grad(grad_output: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output.data().iter().map(|&g| f(g)).collect();
    Tensor::from_vec(data, grad_output.shape())
}

fn zip_grad(grad_output: &Tensor, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
    let data: Vec<f32> = grad_output
        .data()
        .iter()
        .zip(other.data().iter())
        .map(|(&g, &o)| f(g, o))
        .collect();
    Tensor::from_vec(data, grad_output.shape())
}

// ============================================================================
// Element-wise Operations
// ============================================================================

/// Gradient function for addition: z = x + y
pub(crate) struct AddBackward;

impl GradFn for AddBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.clone(), grad_output.clone()]
    }

    fn name(&self) -> &'static str {
        "AddBackward"
    }
}

/// Gradient function for subtraction: z = x - y
pub(crate) struct SubBackward;

impl GradFn for SubBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x-y)/∂x = 1, ∂(x-y)/∂y = -1
        vec![grad_output.clone(), map_grad(grad_output, |g| -g)]
    }

    fn name(&self) -> &'static str {
        "SubBackward"
    }
}

/// Gradient function for negation: z = -x
pub(crate) struct NegBackward;

impl GradFn for NegBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![map_grad(grad_output, |g| -g)]
    }

    fn name(&self) -> &'static str {
        "NegBackward"
    }
}

/// Gradient function for z = x + c
pub(crate) struct AddScalarBackward;

impl GradFn for AddScalarBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![grad_output.clone()]
    }

    fn name(&self) -> &'static str {
        "AddScalarBackward"
    }
}

/// Gradient function for pow: z = x^n
pub(crate) struct PowBackward {
    pub(crate) x: Tensor,
    pub(crate) n: f32,
}

impl GradFn for PowBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂(x^n)/∂x = n * x^(n-1)
        let n = self.n;
        vec![zip_grad(grad_output, &self.x, |g, x| g * n * x.powf(n - 1.0))]
    }

    fn name(&self) -> &'static str {
        "PowBackward"
    }
}

/// Gradient function for sqrt: z = sqrt(x)
pub(crate) struct SqrtBackward {
    pub(crate) output: Tensor,
}

impl GradFn for SqrtBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂sqrt(x)/∂x = 0.5 / sqrt(x)
        vec![zip_grad(grad_output, &self.output, |g, s| g * 0.5 / s)]
    }

    fn name(&self) -> &'static str {
        "SqrtBackward"
    }
}

/// Gradient function for `ReLU`: z = max(0, x)
pub(crate) struct ReluBackward {
    pub(crate) x: Tensor,
}

impl GradFn for ReluBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        vec![zip_grad(grad_output, &self.x, |g, x| if x > 0.0 { g } else { 0.0 })]
    }

    fn name(&self) -> &'static str {
        "ReluBackward"
    }
}

// ============================================================================
// Reduction Operations
// ============================================================================

/// Gradient function for sum: z = sum(x)
pub(crate) struct SumBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for SumBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.item();
        let numel: usize = self.input_shape.iter().product();
        vec![Tensor::from_vec(vec![g; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "SumBackward"
    }
}

/// Gradient function for mean: z = mean(x)
pub(crate) struct MeanBackward {
    pub(crate) input_shape: Vec<usize>,
}

impl GradFn for MeanBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let numel: usize = self.input_shape.iter().product();
        let grad_val = grad_output.item() / numel as f32;
        vec![Tensor::from_vec(vec![grad_val; numel], &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "MeanBackward"
    }
}

/// Gradient function for row sums: z[i] = Σ_j x[i, j]
pub(crate) struct SumRowsBackward {
    pub(crate) rows: usize,
    pub(crate) cols: usize,
}

impl GradFn for SumRowsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let mut data = Vec::with_capacity(self.rows * self.cols);
        for &g in grad_output.data() {
            data.extend(std::iter::repeat(g).take(self.cols));
        }
        vec![Tensor::from_vec(data, &[self.rows, self.cols])]
    }

    fn name(&self) -> &'static str {
        "SumRowsBackward"
    }
}

// ============================================================================
// Linear Algebra
// ============================================================================

/// Gradient function for matmul: z = x @ y
pub(crate) struct MatmulBackward {
    pub(crate) x: Tensor,
    pub(crate) y: Tensor,
}

impl GradFn for MatmulBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        // ∂L/∂x = g @ yᵀ, ∂L/∂y = xᵀ @ g
        let (m, k) = (self.x.shape()[0], self.x.shape()[1]);
        let n = self.y.shape()[1];
        let (x, y, g) = (self.x.data(), self.y.data(), grad_output.data());

        let mut grad_x = vec![0.0; m * k];
        for i in 0..m {
            for p in 0..k {
                grad_x[i * k + p] = (0..n).map(|j| g[i * n + j] * y[p * n + j]).sum();
            }
        }

        let mut grad_y = vec![0.0; k * n];
        for p in 0..k {
            for j in 0..n {
                grad_y[p * n + j] = (0..m).map(|i| x[i * k + p] * g[i * n + j]).sum();
            }
        }

        vec![
            Tensor::from_vec(grad_x, &[m, k]),
            Tensor::from_vec(grad_y, &[k, n]),
        ]
    }

    fn name(&self) -> &'static str {
        "MatmulBackward"
    }
}

/// Gradient function for a 2D transpose.
pub(crate) struct TransposeBackward;

impl GradFn for TransposeBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let (rows, cols) = (grad_output.shape()[0], grad_output.shape()[1]);
        let g = grad_output.data();
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[j * rows + i] = g[i * cols + j];
            }
        }
        vec![Tensor::from_vec(data, &[cols, rows])]
    }

    fn name(&self) -> &'static str {
        "TransposeBackward"
    }
}

// ============================================================================
// Indexing
// ============================================================================

/// Gradient function for a row gather: z = x[indices]
///
/// Rows selected more than once receive the sum of their gradients.
pub(crate) struct IndexSelectBackward {
    pub(crate) input_shape: Vec<usize>,
    pub(crate) indices: Vec<usize>,
}

impl GradFn for IndexSelectBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let width: usize = self.input_shape.iter().skip(1).product();
        let numel: usize = self.input_shape.iter().product();
        let mut data = vec![0.0; numel];
        let g = grad_output.data();
        for (out_row, &src_row) in self.indices.iter().enumerate() {
            let dst = &mut data[src_row * width..(src_row + 1) * width];
            for (d, &v) in dst.iter_mut().zip(&g[out_row * width..(out_row + 1) * width]) {
                *d += v;
            }
        }
        vec![Tensor::from_vec(data, &self.input_shape)]
    }

    fn name(&self) -> &'static str {
        "IndexSelectBackward"
    }
}

/// Gradient function for row concatenation: z = [x0; x1; ...]
pub(crate) struct CatRowsBackward {
    pub(crate) input_shapes: Vec<Vec<usize>>,
}

impl GradFn for CatRowsBackward {
    fn backward(&self, grad_output: &Tensor) -> Vec<Tensor> {
        let g = grad_output.data();
        let mut offset = 0;
        self.input_shapes
            .iter()
            .map(|shape| {
                let numel: usize = shape.iter().product();
                let part = g[offset..offset + numel].to_vec();
                offset += numel;
                Tensor::from_vec(part, shape)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "CatRowsBackward"
    }
}
