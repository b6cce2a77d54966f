//! Metriclearn: cross-batch memory for deep metric learning in pure Rust.
//!
//! Metric losses only see the relations inside the current batch. A
//! cross-batch memory keeps a circular bank of recent embeddings so every
//! batch is also contrasted with many more examples than fit in it, at the
//! cost of one detached copy per batch.
//!
//! # Quick Start
//!
//! ```
//! use metriclearn::prelude::*;
//!
//! let config = CrossBatchMemoryConfig::new(16, 64);
//! let mut criterion = CrossBatchMemory::new(ContrastiveLoss::default(), config)
//!     .unwrap()
//!     .with_miner(MultiSimilarityMiner::new(0.3).unwrap());
//!
//! for step in 0..4 {
//!     let embeddings = randn(8, 16, Some(step)).requires_grad();
//!     let labels = random_labels(8, 3, Some(100 + step));
//!
//!     let loss = criterion.forward(&embeddings, &labels, None).unwrap();
//!     loss.backward();
//!     clear_graph();
//! }
//!
//! assert_eq!(criterion.queue_idx(), 32);
//! ```
//!
//! # Modules
//!
//! - [`autograd`]: Tape-based reverse-mode differentiation over `Tensor`
//! - [`mining`]: Relation tuples, enumeration, and miners
//! - [`memory`]: Fixed-capacity circular embedding bank
//! - [`loss`]: Metric losses and the cross-batch memory wrapper
//! - [`init`]: Seeded random embeddings and labels
//! - [`error`]: Crate error type

pub mod autograd;
pub mod error;
pub mod init;
pub mod loss;
pub mod memory;
pub mod mining;
pub mod prelude;

pub use error::{MetricError, Result};
pub use loss::{CrossBatchMemory, CrossBatchMemoryConfig, MemoryUpdate, MetricLoss};
pub use memory::MemoryBank;
pub use mining::{IndicesTuple, Miner};
