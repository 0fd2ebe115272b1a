//! AirQ Pipeline - feature preparation for the UCI Air Quality dataset
//!
//! Modules:
//! - `raw`: semicolon-delimited, comma-decimal CSV reader
//! - `clean`: sentinel handling, row/column thresholds, calendar features, median fill
//! - `table`: named numeric tables shared by the pipeline and the trainer
//! - `scaler`: zero-mean, unit-variance feature scaler
//! - `preprocessor`: the fitted feature pipeline used for training and inference

pub mod clean;
pub mod errors;
pub mod preprocessor;
pub mod raw;
pub mod scaler;
pub mod table;

pub use clean::{clean, load_and_clean, DERIVED_COLUMNS, MISSING_SENTINEL};
pub use errors::PipelineError;
pub use preprocessor::{FeaturePipeline, PREPROCESSOR_TARGETS};
pub use raw::{read_raw_table, Cell, RawTable, UCI_COLUMNS};
pub use scaler::StandardScaler;
pub use table::Table;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
