//! Trained multi-target model bundle
//!
//! Holds one booster and one feature scaler per target, the frozen feature
//! list and held-out scores. Persisted with bincode as a single file plus
//! per-target copies of each model and scaler.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use airq_pipeline::StandardScaler;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::errors::{ModelError, Result};
use crate::gbdt::GbdtModel;
use crate::metrics::RegressionMetrics;
use crate::trainer::TrainingParams;

/// File holding the whole bundle inside the model directory
pub const BUNDLE_FILE: &str = "air_quality_model.bin";

/// File-name stem for a target: `CO(GT)` -> `COGT`, `PM2.5` -> `PM2_5`
pub fn target_file_stem(target: &str) -> String {
    target.replace(['(', ')'], "").replace('.', "_")
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelBundle {
    pub models: BTreeMap<String, GbdtModel>,
    pub scalers: BTreeMap<String, StandardScaler>,
    pub feature_names: Vec<String>,
    pub target_names: Vec<String>,
    pub accuracy: BTreeMap<String, RegressionMetrics>,
    pub params: TrainingParams,
    /// Unix seconds of the training run
    pub trained_at: i64,
}

impl ModelBundle {
    pub fn is_trained(&self) -> bool {
        !self.models.is_empty()
    }

    /// Predict every target for one feature row.
    ///
    /// A target without a model or scaler, or whose prediction fails,
    /// reports 0.0; the other targets are unaffected.
    pub fn predict(&self, row: &[f64]) -> Result<BTreeMap<String, f64>> {
        if !self.is_trained() {
            return Err(ModelError::NotFitted(
                "model bundle has not been trained".to_string(),
            ));
        }

        let mut predictions = BTreeMap::new();
        for target in &self.target_names {
            let value = match (self.models.get(target), self.scalers.get(target)) {
                (Some(model), Some(scaler)) => match Self::predict_target(target, model, scaler, row)
                {
                    Ok(value) => value,
                    Err(e) => {
                        error!("Prediction error for {}: {}", target, e);
                        0.0
                    }
                },
                _ => {
                    warn!("Model for {} not found", target);
                    0.0
                }
            };
            predictions.insert(target.clone(), value);
        }
        Ok(predictions)
    }

    fn predict_target(
        target: &str,
        model: &GbdtModel,
        scaler: &StandardScaler,
        row: &[f64],
    ) -> Result<f64> {
        let as_prediction_error = |reason: String| ModelError::Prediction {
            target: target.to_string(),
            reason,
        };
        let scaled = scaler
            .transform_row(row)
            .map_err(|e| as_prediction_error(e.to_string()))?;
        model
            .predict_row(&scaled)
            .map_err(|e| as_prediction_error(e.to_string()))
    }

    /// Feature importance for one target, highest first.
    ///
    /// Empty when the target has no model.
    pub fn feature_importance(&self, target: &str) -> Vec<(String, f64)> {
        let Some(model) = self.models.get(target) else {
            return Vec::new();
        };

        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(model.feature_importances())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    /// Write the bundle and the per-target model and scaler files into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        write_bincode(&dir.join(BUNDLE_FILE), self)?;
        for (target, model) in &self.models {
            let stem = target_file_stem(target);
            write_bincode(&dir.join(format!("{stem}_model.bin")), model)?;
            if let Some(scaler) = self.scalers.get(target) {
                write_bincode(&dir.join(format!("{stem}_scaler.bin")), scaler)?;
            }
        }

        info!("Models saved to {}", dir.display());
        Ok(())
    }

    /// Read a bundle saved with [`ModelBundle::save`].
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let bundle: ModelBundle = read_bincode(&dir.join(BUNDLE_FILE))?;
        info!(
            "Models loaded from {} ({} targets, {} features)",
            dir.display(),
            bundle.models.len(),
            bundle.feature_names.len()
        );
        Ok(bundle)
    }

    /// Replace this bundle with the one stored in `dir`.
    ///
    /// Returns `false` and leaves `self` untouched when no bundle file
    /// exists. The feature list is taken over as stored.
    pub fn reload_from<P: AsRef<Path>>(&mut self, dir: P) -> Result<bool> {
        let dir = dir.as_ref();
        if !dir.join(BUNDLE_FILE).exists() {
            return Ok(false);
        }
        *self = Self::load(dir)?;
        Ok(true)
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn read_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(bincode::deserialize(&bytes)?)
}
