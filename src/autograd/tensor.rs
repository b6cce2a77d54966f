//! Row-major `f32` tensor that records its history on the autograd tape.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::with_graph;

/// Identity of a tensor on the tape. Clones share it; `detach` mints a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorId(u64);

impl TensorId {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        TensorId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Dense tensor with optional gradient tracking.
///
/// Embedding batches are `[rows, embedding_size]`. Leaves created with
/// [`Tensor::requires_grad`] receive gradients through [`super::get_grad`]
/// after [`Tensor::backward`]; tensors produced by an op carry the op's
/// backward function and are never leaves.
#[derive(Clone)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
    grad: Option<Box<Tensor>>,
    requires_grad: bool,
    is_leaf: bool,
    grad_fn: Option<Arc<dyn GradFn>>,
    id: TensorId,
}

impl Tensor {
    /// Copy `data` into a tensor of the given shape, without tracking.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not the product of `shape`.
    #[must_use]
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Like [`Tensor::new`] but takes ownership of `data`.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` is not the product of `shape`.
    #[must_use]
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let expected_len: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_len,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_len
        );

        Self {
            data,
            shape: shape.to_vec(),
            grad: None,
            requires_grad: false,
            is_leaf: true,
            grad_fn: None,
            id: TensorId::new(),
        }
    }

    /// 1D tensor over `data`.
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self::new(data, &[data.len()])
    }

    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_vec(vec![0.0; shape.iter().product()], shape)
    }

    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        Self::from_vec(vec![1.0; shape.iter().product()], shape)
    }

    /// Mark this tensor as a leaf that collects gradients.
    #[must_use]
    pub fn requires_grad(mut self) -> Self {
        self.requires_grad = true;
        self
    }

    #[must_use]
    pub fn requires_grad_enabled(&self) -> bool {
        self.requires_grad
    }

    /// `false` for tensors produced by a tracked op.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.is_leaf
    }

    #[must_use]
    pub fn id(&self) -> TensorId {
        self.id
    }

    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Size of the first dimension, 0 for a 0-d tensor.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Product of the trailing dimensions.
    #[must_use]
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Borrow row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        let width = self.row_len();
        &self.data[i * width..(i + 1) * width]
    }

    pub(crate) fn grad(&self) -> Option<&Tensor> {
        self.grad.as_deref()
    }

    pub(crate) fn clear_grad(&mut self) {
        self.grad = None;
    }

    /// Add `grad` into the stored gradient.
    pub(crate) fn accumulate_grad(&mut self, grad: Tensor) {
        if let Some(existing) = self.grad.as_mut() {
            for (acc, g) in existing.data.iter_mut().zip(&grad.data) {
                *acc += g;
            }
        } else {
            self.grad = Some(Box::new(grad));
        }
    }

    /// Turn this tensor into the tracked output of an op.
    pub(crate) fn set_grad_fn(&mut self, grad_fn: Arc<dyn GradFn>) {
        self.grad_fn = Some(grad_fn);
        self.requires_grad = true;
        self.is_leaf = false;
    }

    /// Name of the op that produced this tensor.
    #[must_use]
    pub fn grad_fn_name(&self) -> Option<&'static str> {
        self.grad_fn.as_ref().map(|f| f.name())
    }

    /// Untracked copy with a fresh identity; nothing done to the graph later
    /// reaches it.
    #[must_use]
    pub fn detach(&self) -> Tensor {
        Tensor::from_vec(self.data.clone(), &self.shape)
    }

    /// Value of a one-element tensor.
    ///
    /// # Panics
    ///
    /// Panics if the tensor does not hold exactly one element.
    #[must_use]
    pub fn item(&self) -> f32 {
        assert_eq!(
            self.numel(),
            1,
            "item() only works on tensors with exactly 1 element, got {}",
            self.numel()
        );
        self.data[0]
    }

    /// Backpropagate from this scalar through the tape.
    ///
    /// # Panics
    ///
    /// Panics unless the tensor holds exactly one element.
    pub fn backward(&self) {
        assert_eq!(
            self.numel(),
            1,
            "backward() requires scalar output, got shape {:?}",
            self.shape
        );
        let seed = Tensor::ones(&self.shape);
        with_graph(|graph| graph.backward(self.id, seed));
    }
}

impl PartialEq for Tensor {
    /// Value equality: same shape and bit-identical data. Graph state is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape && self.data == other.data
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("requires_grad", &self.requires_grad)
            .field("is_leaf", &self.is_leaf)
            .field("has_grad", &self.grad.is_some())
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "tensor_tests.rs"]
mod tests;
