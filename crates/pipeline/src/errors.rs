use thiserror::Error;

/// Errors returned by the feature pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unreadable or unusable source data.
    #[error("data error: {0}")]
    Data(String),

    /// A transform was requested before `fit`.
    #[error("preprocessor not fitted: {0}")]
    NotFitted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
