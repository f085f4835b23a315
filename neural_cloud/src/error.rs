//! Error types for neural_cloud.

use thiserror::Error;

/// Errors that can occur while building, training or checkpointing models.
#[derive(Error, Debug)]
pub enum NeuralCloudError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Displacement damping radius that is not a positive finite number.
    #[error("invalid radius {radius}: must be positive and finite")]
    InvalidRadius {
        /// The rejected radius.
        radius: f64,
    },

    /// Tensor shape mismatch.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        got: Vec<usize>,
    },

    /// Training error (non-finite loss and similar fatal conditions).
    #[error("training error: {message}")]
    TrainingError {
        /// Description of the error.
        message: String,
    },

    /// Checkpoint could not be found or is incomplete.
    #[error("checkpoint error: {message}")]
    Checkpoint {
        /// Description of the error.
        message: String,
    },

    /// Burn recorder failure while saving or loading parameters.
    #[error("record error: {0}")]
    Record(String),

    /// Sampling or grouping failure from cloud_core.
    #[error("geometry error: {0}")]
    Geometry(#[from] cloud_core::CloudCoreError),

    /// Filesystem I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or corrupted data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<burn::record::RecorderError> for NeuralCloudError {
    fn from(err: burn::record::RecorderError) -> Self {
        NeuralCloudError::Record(format!("{:?}", err))
    }
}

impl NeuralCloudError {
    /// Shorthand for [`NeuralCloudError::InvalidConfig`].
    pub fn config(message: impl Into<String>) -> Self {
        NeuralCloudError::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for neural_cloud operations.
pub type Result<T> = std::result::Result<T, NeuralCloudError>;
