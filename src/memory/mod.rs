//! Fixed-capacity circular store of past embeddings and labels.
//!
//! The bank is an arena of `capacity` slots written in FIFO order by a single
//! cursor. It never grows: once full, each append overwrites the oldest
//! physical slots. Stored embeddings are detached copies, so nothing in the
//! bank is reachable from a later backward pass.
//!
//! # Example
//!
//! ```
//! use metriclearn::autograd::Tensor;
//! use metriclearn::memory::MemoryBank;
//!
//! let mut bank = MemoryBank::new(2, 3).unwrap();
//! let batch = Tensor::new(&[1.0, 1.0, 2.0, 2.0], &[2, 2]);
//!
//! assert_eq!(bank.append(&batch, &[0, 1]).unwrap(), (0, 2));
//! assert_eq!(bank.len(), 2);
//!
//! // The second write wraps: slot 2, then slot 0
//! assert_eq!(bank.append(&batch, &[2, 3]).unwrap(), (2, 1));
//! assert!(bank.is_filled());
//! assert_eq!(bank.queue_idx(), 1);
//! assert_eq!(bank.label_memory(), &[3, 1, 2]);
//! ```

use tracing::{debug, trace};

use crate::autograd::Tensor;
use crate::error::{MetricError, Result};

/// Circular embedding/label memory.
#[derive(Debug, Clone)]
pub struct MemoryBank {
    embedding_size: usize,
    capacity: usize,
    /// Row-major `[capacity, embedding_size]`
    embeddings: Vec<f32>,
    labels: Vec<i64>,
    /// Next write position, always `< capacity`
    queue_idx: usize,
    /// Set the first time the cursor wraps
    has_been_filled: bool,
}

impl MemoryBank {
    /// Creates an empty bank of `capacity` slots of width `embedding_size`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if either size is zero.
    pub fn new(embedding_size: usize, capacity: usize) -> Result<Self> {
        if embedding_size == 0 {
            return Err(MetricError::configuration("embedding_size", 0, "> 0"));
        }
        if capacity == 0 {
            return Err(MetricError::configuration("memory_size", 0, "> 0"));
        }

        Ok(Self {
            embedding_size,
            capacity,
            embeddings: vec![0.0; capacity * embedding_size],
            labels: vec![0; capacity],
            queue_idx: 0,
            has_been_filled: false,
        })
    }

    /// Width of each stored embedding.
    #[must_use]
    pub fn embedding_size(&self) -> usize {
        self.embedding_size
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Next write position.
    #[must_use]
    pub fn queue_idx(&self) -> usize {
        self.queue_idx
    }

    /// Whether the cursor has wrapped at least once.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.has_been_filled
    }

    /// Number of slots holding real data.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.has_been_filled {
            self.capacity
        } else {
            self.queue_idx
        }
    }

    /// True before anything has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check a batch against the bank's width and capacity.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` for a non-2D tensor, a width other than
    /// `embedding_size`, or a label count that differs from the row count;
    /// `Configuration` when the batch has more rows than the bank has slots.
    pub fn check_batch(&self, embeddings: &Tensor, labels: &[i64]) -> Result<()> {
        if embeddings.ndim() != 2 || embeddings.shape()[1] != self.embedding_size {
            return Err(MetricError::shape_mismatch(
                format!("[batch, {}]", self.embedding_size),
                format!("{:?}", embeddings.shape()),
            ));
        }
        let batch_size = embeddings.rows();
        if labels.len() != batch_size {
            return Err(MetricError::shape_mismatch(
                format!("{batch_size} labels"),
                format!("{} labels", labels.len()),
            ));
        }
        if batch_size > self.capacity {
            return Err(MetricError::configuration(
                "batch_size",
                batch_size,
                format!("<= memory_size ({})", self.capacity),
            ));
        }
        Ok(())
    }

    /// Writes a batch at the cursor, wrapping around the end of the buffer.
    ///
    /// Returns `(start, end)`: the batch now occupies `start..end`, or
    /// `start..capacity` followed by `0..end` when `end <= start`. A write
    /// that finishes exactly at the last slot reports `end == capacity`.
    ///
    /// # Errors
    ///
    /// See [`MemoryBank::check_batch`].
    pub fn append(&mut self, embeddings: &Tensor, labels: &[i64]) -> Result<(usize, usize)> {
        self.check_batch(embeddings, labels)?;

        let batch_size = labels.len();
        let start = self.queue_idx;
        if batch_size == 0 {
            return Ok((start, start));
        }

        let snapshot = embeddings.detach();
        let width = self.embedding_size;
        let head = batch_size.min(self.capacity - start);
        let tail = batch_size - head;

        self.embeddings[start * width..(start + head) * width]
            .copy_from_slice(&snapshot.data()[..head * width]);
        self.labels[start..start + head].copy_from_slice(&labels[..head]);
        if tail > 0 {
            self.embeddings[..tail * width].copy_from_slice(&snapshot.data()[head * width..]);
            self.labels[..tail].copy_from_slice(&labels[head..]);
        }

        let end = if start + batch_size == self.capacity {
            self.capacity
        } else {
            (start + batch_size) % self.capacity
        };

        self.queue_idx = (start + batch_size) % self.capacity;
        if !self.has_been_filled && self.queue_idx <= start {
            self.has_been_filled = true;
            debug!(
                capacity = self.capacity,
                queue_idx = self.queue_idx,
                "memory bank completed its first cycle"
            );
        }

        trace!(start, end, batch_size, wrapped = tail > 0, "appended batch to memory bank");
        Ok((start, end))
    }

    /// Detached `[len, embedding_size]` tensor of the slots holding data.
    #[must_use]
    pub fn embeddings(&self) -> Tensor {
        let rows = self.len();
        Tensor::new(
            &self.embeddings[..rows * self.embedding_size],
            &[rows, self.embedding_size],
        )
    }

    /// Labels of the slots holding data.
    #[must_use]
    pub fn labels(&self) -> &[i64] {
        &self.labels[..self.len()]
    }

    /// The whole physical embedding buffer, `[capacity, embedding_size]`,
    /// including slots not yet written (zeros).
    #[must_use]
    pub fn embedding_memory(&self) -> Tensor {
        Tensor::new(&self.embeddings, &[self.capacity, self.embedding_size])
    }

    /// The whole physical label buffer.
    #[must_use]
    pub fn label_memory(&self) -> &[i64] {
        &self.labels
    }

    /// Reads `start..end`, wrapping around when `end <= start`.
    ///
    /// This is the inverse of [`MemoryBank::append`]: passing back the
    /// returned range yields the batch that was written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndices` when `start >= capacity` or `end > capacity`.
    pub fn read_range(&self, start: usize, end: usize) -> Result<(Tensor, Vec<i64>)> {
        if start >= self.capacity || end > self.capacity {
            return Err(MetricError::invalid_indices(format!(
                "range {start}..{end} outside memory of {} slots",
                self.capacity
            )));
        }

        let slots: Vec<usize> = if start < end {
            (start..end).collect()
        } else {
            (start..self.capacity).chain(0..end).collect()
        };

        let labels = slots.iter().map(|&i| self.labels[i]).collect();
        let embeddings = self.embedding_memory().index_select(&slots);
        Ok((embeddings, labels))
    }

    /// Zero the storage and rewind the cursor.
    pub fn reset(&mut self) {
        self.embeddings.iter_mut().for_each(|v| *v = 0.0);
        self.labels.iter_mut().for_each(|l| *l = 0);
        self.queue_idx = 0;
        self.has_been_filled = false;
    }
}
