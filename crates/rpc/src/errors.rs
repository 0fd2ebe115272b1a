use airq_dataset::DatasetError;
use airq_model::ModelError;
use airq_pipeline::PipelineError;
use thiserror::Error;

/// Failures of the service core, mapped to HTTP statuses by the server.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No trained model (or no fitted preprocessor) is loaded.
    #[error("Model not loaded")]
    NotLoaded,

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
