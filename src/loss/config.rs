//! Cross-batch memory configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MetricError, Result};

/// When the current batch enters the memory bank relative to indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryUpdate {
    /// Relate the batch to embeddings from earlier batches only, then append
    /// it once the loss has been computed.
    #[default]
    AfterLoss,
    /// Append the batch first, so its relations include its own freshly
    /// stored (detached) copy.
    BeforeIndexing,
}

/// Configuration for [`CrossBatchMemory`](super::CrossBatchMemory).
///
/// # Example
///
/// ```
/// use metriclearn::loss::{CrossBatchMemoryConfig, MemoryUpdate};
///
/// let config = CrossBatchMemoryConfig::new(128, 1024)
///     .with_update_order(MemoryUpdate::BeforeIndexing);
///
/// let json = config.to_json().unwrap();
/// let restored = CrossBatchMemoryConfig::from_json(&json).unwrap();
/// assert_eq!(restored, config);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossBatchMemoryConfig {
    /// Width `D` of every embedding.
    pub embedding_size: usize,
    /// Number of remembered embeddings.
    pub memory_size: usize,
    /// When batches enter the memory.
    #[serde(default)]
    pub update_order: MemoryUpdate,
}

impl CrossBatchMemoryConfig {
    /// Create a configuration with the default update order.
    #[must_use]
    pub fn new(embedding_size: usize, memory_size: usize) -> Self {
        Self {
            embedding_size,
            memory_size,
            update_order: MemoryUpdate::default(),
        }
    }

    /// Set the embedding width.
    #[must_use]
    pub fn with_embedding_size(mut self, embedding_size: usize) -> Self {
        self.embedding_size = embedding_size;
        self
    }

    /// Set the memory capacity.
    #[must_use]
    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    /// Set when batches are appended to memory.
    #[must_use]
    pub fn with_update_order(mut self, update_order: MemoryUpdate) -> Self {
        self.update_order = update_order;
        self
    }

    /// Check that both sizes are positive.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.embedding_size == 0 {
            return Err(MetricError::configuration("embedding_size", 0, "> 0"));
        }
        if self.memory_size == 0 {
            return Err(MetricError::configuration("memory_size", 0, "> 0"));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// `Serialization` for malformed JSON, `Configuration` for invalid sizes.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
