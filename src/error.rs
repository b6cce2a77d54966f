//! Error types for metriclearn operations.
//!
//! Every fallible public entry point returns [`Result`]. Programming errors
//! inside the tensor runtime (mismatched shapes passed to a raw op) still
//! panic with a descriptive message, the way the autograd engine reports them.

use thiserror::Error;

/// Result type alias for metriclearn operations.
pub type Result<T> = std::result::Result<T, MetricError>;

/// Main error type for metriclearn operations.
///
/// # Examples
///
/// ```
/// use metriclearn::error::MetricError;
///
/// let err = MetricError::ShapeMismatch {
///     expected: "[32, 128]".to_string(),
///     actual: "[32, 64]".to_string(),
/// };
/// assert!(err.to_string().contains("shape mismatch"));
/// ```
#[derive(Error, Debug)]
pub enum MetricError {
    /// A configuration value is out of range (e.g. batch larger than the memory).
    #[error("Invalid configuration: {param} = {value}, expected {constraint}")]
    Configuration {
        /// Parameter name
        param: String,
        /// Provided value
        value: String,
        /// Constraint description
        constraint: String,
    },

    /// Embedding or label dimensions don't match what the operation expects.
    #[error("Tensor shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Expected shape description
        expected: String,
        /// Actual shape found
        actual: String,
    },

    /// A relation index tuple is malformed or points outside its index space.
    #[error("Invalid indices tuple: {message}")]
    InvalidIndices {
        /// Error description
        message: String,
    },

    /// Configuration (de)serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl MetricError {
    /// Build a [`MetricError::Configuration`] from displayable parts.
    pub fn configuration(
        param: impl Into<String>,
        value: impl ToString,
        constraint: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            param: param.into(),
            value: value.to_string(),
            constraint: constraint.into(),
        }
    }

    /// Build a [`MetricError::ShapeMismatch`] from displayable parts.
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Build a [`MetricError::InvalidIndices`].
    pub fn invalid_indices(message: impl Into<String>) -> Self {
        Self::InvalidIndices {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for MetricError {
    fn from(err: serde_json::Error) -> Self {
        MetricError::Serialization(err.to_string())
    }
}
