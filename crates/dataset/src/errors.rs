use thiserror::Error;

/// Errors returned while acquiring or inspecting the dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("no CSV file found in the downloaded archive")]
    NoCsvEntry,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("dataset not found at {0}")]
    NotFound(String),

    #[error(transparent)]
    Pipeline(#[from] airq_pipeline::PipelineError),
}

pub type Result<T> = std::result::Result<T, DatasetError>;
