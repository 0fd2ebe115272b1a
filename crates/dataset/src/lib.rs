//! AirQ Dataset - acquisition of the UCI Air Quality dataset
//!
//! Given no path, [`DatasetProvider::get_dataset_path`] always hands back a
//! readable semicolon-delimited, comma-decimal CSV with the UCI schema:
//! the cached copy, a fresh download, or a five-row synthetic sample.

pub mod errors;
pub mod info;
pub mod provider;
pub mod sample;

pub use errors::DatasetError;
pub use info::{dataset_info, DatasetInfo};
pub use provider::{DatasetProvider, DATASET_FILE, DEFAULT_DATASET_URL};
pub use sample::{create_sample_dataset, write_sample_csv};
