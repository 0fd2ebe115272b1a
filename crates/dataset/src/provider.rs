use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::errors::{DatasetError, Result};
use crate::sample::create_sample_dataset;

/// File name of the cached dataset inside the data directory.
pub const DATASET_FILE: &str = "AirQualityUCI.csv";

/// UCI archive holding `AirQualityUCI.csv`.
pub const DEFAULT_DATASET_URL: &str =
    "https://archive.ics.uci.edu/ml/machine-learning-databases/00360/AirQualityUCI.zip";

const ARCHIVE_FILE: &str = "AirQualityUCI.zip";

/// Supplies the path of a readable UCI Air Quality CSV file.
#[derive(Clone, Debug)]
pub struct DatasetProvider {
    data_dir: PathBuf,
    url: String,
    client: reqwest::Client,
}

impl DatasetProvider {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(data_dir: P, url: S) -> Self {
        Self {
            data_dir: data_dir.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Location of the cached dataset, whether or not it exists yet.
    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(DATASET_FILE)
    }

    /// Return the cached dataset, downloading it first if needed.
    ///
    /// A failed download falls back to the synthetic sample, so the only
    /// error left is failing to write that sample.
    pub async fn get_dataset_path(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.data_dir)?;

        let dataset_path = self.dataset_path();
        if dataset_path.exists() {
            info!("Dataset already exists at {}", dataset_path.display());
            return Ok(dataset_path);
        }

        match self.download().await {
            Ok(path) => Ok(path),
            Err(err) => {
                error!("Error downloading dataset: {}", err);
                info!("Creating sample dataset for testing...");
                create_sample_dataset(&self.data_dir)
            }
        }
    }

    async fn download(&self) -> Result<PathBuf> {
        info!("Downloading UCI Air Quality dataset from {}", self.url);
        let bytes = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        info!("Dataset downloaded successfully ({} bytes)", bytes.len());

        let archive_path = self.data_dir.join(ARCHIVE_FILE);
        let dataset_path = self.dataset_path();
        fs::write(&archive_path, &bytes)?;

        let extracted = {
            let archive_path = archive_path.clone();
            let dataset_path = dataset_path.clone();
            tokio::task::spawn_blocking(move || extract_first_csv(&archive_path, &dataset_path))
                .await
                .map_err(|err| DatasetError::Io(io::Error::new(io::ErrorKind::Other, err)))?
        };
        // The archive is scratch space either way.
        let _ = fs::remove_file(&archive_path);
        extracted?;

        info!("Dataset extracted and saved to {}", dataset_path.display());
        Ok(dataset_path)
    }
}

/// Copy the first `.csv` entry of a zip archive to `dest`.
pub fn extract_first_csv(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx)?;
        if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".csv") {
            let mut out = fs::File::create(dest)?;
            io::copy(&mut entry, &mut out)?;
            return Ok(());
        }
    }

    Err(DatasetError::NoCsvEntry)
}
