//! Computation graph for automatic differentiation.
//!
//! Tape-based recording of operations and the backward pass.

use std::collections::HashMap;
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

/// Entry in the computation tape.
#[derive(Clone)]
pub(crate) struct TapeEntry {
    pub output_id: TensorId,
    pub grad_fn: Arc<dyn GradFn>,
    /// Inputs in the order `grad_fn.backward` returns their gradients
    pub input_ids: Vec<TensorId>,
}

/// Computation graph that records operations for backward pass.
///
/// Operations are appended in execution order during the forward pass and
/// replayed in reverse during [`ComputationGraph::backward`]. Each thread owns
/// its own graph, so a training loop needs no synchronization.
#[allow(missing_debug_implementations)]
pub struct ComputationGraph {
    tape: Vec<TapeEntry>,

    /// Tensors that took part in a recorded op, keyed by ID. Leaf entries
    /// receive their gradient here.
    tensors: HashMap<TensorId, Tensor>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            tensors: HashMap::new(),
        }
    }

    /// Clear all recorded operations and registered tensors.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.tensors.clear();
    }

    /// Register a tensor that participates in a recorded operation.
    ///
    /// Registering the same ID twice keeps the first copy, so a gradient
    /// accumulated on it is never overwritten.
    pub fn register_tensor(&mut self, tensor: Tensor) {
        self.tensors.entry(tensor.id()).or_insert(tensor);
    }

    /// Record an operation to the tape.
    pub fn record(
        &mut self,
        output_id: TensorId,
        grad_fn: Arc<dyn GradFn>,
        input_ids: Vec<TensorId>,
    ) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Get a registered tensor by ID.
    #[must_use]
    pub fn get_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    /// Compute gradients via backpropagation.
    ///
    /// 1. Seed `grad_output` for the output tensor
    /// 2. Walk the tape in reverse order
    /// 3. For each operation with a known output gradient, compute input gradients
    /// 4. Sum gradients for tensors used multiple times
    /// 5. Store the totals on registered leaf tensors that require grad
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let Some(grad_out) = grads.get(&entry.output_id).cloned() else {
                continue;
            };

            let input_grads = entry.grad_fn.backward(&grad_out);
            debug_assert_eq!(
                input_grads.len(),
                entry.input_ids.len(),
                "{} returned the wrong number of gradients",
                entry.grad_fn.name()
            );

            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                match grads.get_mut(input_id) {
                    Some(existing) => {
                        for (a, b) in existing.data_mut().iter_mut().zip(input_grad.data()) {
                            *a += b;
                        }
                    }
                    None => {
                        grads.insert(*input_id, input_grad);
                    }
                }
            }
        }

        for (id, grad) in grads {
            if let Some(tensor) = self.tensors.get_mut(&id) {
                if tensor.requires_grad_enabled() && tensor.is_leaf() {
                    tensor.accumulate_grad(grad);
                }
            }
        }
    }

    /// Get the number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    /// Check if the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Get gradient for a tensor by ID (after backward).
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.tensors.get(&id).and_then(|t| t.grad().cloned())
    }

    /// Clear gradient for a specific tensor.
    pub fn clear_grad(&mut self, id: TensorId) {
        if let Some(tensor) = self.tensors.get_mut(&id) {
            tensor.clear_grad();
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::grad_fn::{AddBackward, NegBackward};

    #[test]
    fn test_graph_creation() {
        let graph = ComputationGraph::default();
        assert!(graph.is_empty());
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_graph_clear() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let id = t.id();
        graph.register_tensor(t);
        graph.record(TensorId::new(), Arc::new(NegBackward), vec![id]);

        graph.clear();
        assert!(graph.is_empty());
        assert!(graph.get_tensor(id).is_none());
    }

    #[test]
    fn test_register_same_tensor_twice_keeps_first() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0]).requires_grad();
        let id = t.id();
        let mut changed = t.clone();
        changed.data_mut()[0] = 5.0;

        graph.register_tensor(t);
        graph.register_tensor(changed);

        let kept = graph.get_tensor(id).expect("registered");
        assert_eq!(kept.data(), &[1.0]);
    }

    #[test]
    fn test_backward_simple() {
        let mut graph = ComputationGraph::new();

        let input = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let input_id = input.id();
        graph.register_tensor(input);

        let output_id = TensorId::new();
        graph.record(output_id, Arc::new(NegBackward), vec![input_id]);

        graph.backward(output_id, Tensor::from_slice(&[1.0, 1.0]));

        let grad = graph.get_grad(input_id).expect("leaf grad");
        assert_eq!(grad.data(), &[-1.0, -1.0]);
    }

    #[test]
    fn test_backward_accumulates_shared_input() {
        let mut graph = ComputationGraph::new();

        let input = Tensor::from_slice(&[3.0]).requires_grad();
        let input_id = input.id();
        graph.register_tensor(input);

        // out = input + input
        let out = TensorId::new();
        graph.record(out, Arc::new(AddBackward), vec![input_id, input_id]);

        graph.backward(out, Tensor::from_slice(&[1.0]));
        let grad = graph.get_grad(input_id).expect("leaf grad");
        assert_eq!(grad.data(), &[2.0]);
    }

    #[test]
    fn test_backward_no_matching_output() {
        let mut graph = ComputationGraph::new();
        let output_id = TensorId::new();
        graph.backward(output_id, Tensor::from_slice(&[1.0]));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_backward_skips_non_grad_leaf() {
        let mut graph = ComputationGraph::new();

        let frozen = Tensor::from_slice(&[1.0]);
        let frozen_id = frozen.id();
        graph.register_tensor(frozen);

        let out = TensorId::new();
        graph.record(out, Arc::new(NegBackward), vec![frozen_id]);
        graph.backward(out, Tensor::from_slice(&[1.0]));

        assert!(graph.get_grad(frozen_id).is_none());
    }

    #[test]
    fn test_clear_grad() {
        let mut graph = ComputationGraph::new();
        let t = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
        let id = t.id();
        graph.register_tensor(t);

        let out = TensorId::new();
        graph.record(out, Arc::new(NegBackward), vec![id]);
        graph.backward(out, Tensor::from_slice(&[1.0, 1.0]));
        assert!(graph.get_grad(id).is_some());

        graph.clear_grad(id);
        assert!(graph.get_grad(id).is_none());

        // Unknown IDs are ignored
        graph.clear_grad(TensorId::new());
    }
}
