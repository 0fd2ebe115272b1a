use airq_pipeline::PipelineError;
use thiserror::Error;

/// Errors returned by the trainer and the model bundle.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Prediction requested from a bundle without trained models.
    #[error("no trained models available: {0}")]
    NotFitted(String),

    /// Any failure while fitting; the whole training call is aborted.
    #[error("training error: {0}")]
    Training(String),

    #[error("feature count mismatch: expected {expected}, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// Failure confined to one target's slot.
    #[error("prediction failed for {target}: {reason}")]
    Prediction { target: String, reason: String },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
