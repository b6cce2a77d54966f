//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use metriclearn::prelude::*;
//! ```

pub use crate::autograd::{clear_graph, get_grad, no_grad, Tensor};
pub use crate::error::{MetricError, Result};
pub use crate::init::{randn, random_labels};
pub use crate::loss::{
    ContrastiveLoss, CrossBatchMemory, CrossBatchMemoryConfig, MemoryUpdate, MetricLoss,
};
pub use crate::memory::MemoryBank;
pub use crate::mining::{
    IndicesTuple, Miner, MultiSimilarityMiner, PairIndices, PairMarginMiner, TripletIndices,
    TripletMarginMiner, TupleKind,
};
