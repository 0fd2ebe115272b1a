//! Synchronous service core behind the HTTP handlers
//!
//! Owns the fitted feature pipeline and the trained bundle. Training
//! builds both and persists them before swapping them in, so a failed run
//! leaves the previous state serving.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use airq_model::{ModelBundle, MultiTargetTrainer, RegressionMetrics, BUNDLE_FILE};
use airq_pipeline::FeaturePipeline;
use chrono::Local;
use tracing::{info, warn};

use crate::errors::{Result, ServiceError};
use crate::types::{
    iso_timestamp, target_short_name, FeatureScore, ModelMetadata, PredictRequest,
    PredictResponse,
};

/// Fitted pipeline file inside the model directory
pub const PREPROCESSOR_FILE: &str = "preprocessor.bin";

const MODEL_TYPE: &str = "Gradient Boosted Trees Regression";

/// Scratch directory inside the model directory for a run being persisted.
const STAGING_DIR: &str = ".staging";

pub struct ServiceCore {
    model_dir: PathBuf,
    trainer: MultiTargetTrainer,
    pipeline: Option<FeaturePipeline>,
    bundle: Option<ModelBundle>,
}

impl ServiceCore {
    pub fn new<P: Into<PathBuf>>(model_dir: P, trainer: MultiTargetTrainer) -> Self {
        Self {
            model_dir: model_dir.into(),
            trainer,
            pipeline: None,
            bundle: None,
        }
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn is_model_loaded(&self) -> bool {
        self.bundle.is_some()
    }

    /// Restore a previously persisted bundle and pipeline, if present.
    ///
    /// Each file is loaded independently; returns which of the two were found.
    pub fn load_existing(&mut self) -> Result<(bool, bool)> {
        let mut bundle = ModelBundle::default();
        let bundle_found = bundle.reload_from(&self.model_dir)?;
        if bundle_found {
            info!("Loaded existing model from {}", self.model_dir.display());
            self.bundle = Some(bundle);
        }

        let preprocessor_path = self.model_dir.join(PREPROCESSOR_FILE);
        let pipeline_found = preprocessor_path.exists();
        if pipeline_found {
            self.pipeline = Some(FeaturePipeline::load(&preprocessor_path)?);
            info!("Loaded existing preprocessor from {}", preprocessor_path.display());
        }

        Ok((bundle_found, pipeline_found))
    }

    /// Train a new bundle and fit a new pipeline on `dataset`, persist both
    /// and make them current. Returns the held-out scores.
    pub fn fit_pipeline_and_train(
        &mut self,
        dataset: &Path,
    ) -> Result<BTreeMap<String, RegressionMetrics>> {
        info!("Training models on {}", dataset.display());

        let mut pipeline = FeaturePipeline::new();
        pipeline.fit(dataset)?;
        let bundle = self.trainer.train_from_path(dataset)?;
        self.persist(&bundle, &pipeline)?;

        let accuracy = bundle.accuracy.clone();
        self.bundle = Some(bundle);
        self.pipeline = Some(pipeline);
        info!("Training complete, models stored in {}", self.model_dir.display());
        Ok(accuracy)
    }

    /// Write the bundle and the pipeline together. Both are staged first and
    /// only moved into the model directory once both writes succeeded.
    fn persist(&self, bundle: &ModelBundle, pipeline: &FeaturePipeline) -> Result<()> {
        let staging = self.model_dir.join(STAGING_DIR);
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        let result = stage(bundle, pipeline, &staging)
            .and_then(|()| promote(&staging, &self.model_dir));
        if let Err(err) = fs::remove_dir_all(&staging) {
            warn!("Could not remove {}: {}", staging.display(), err);
        }
        result
    }

    /// Predict every pollutant for one request.
    pub fn predict_one(&self, request: &PredictRequest) -> Result<PredictResponse> {
        let (Some(bundle), Some(pipeline)) = (&self.bundle, &self.pipeline) else {
            return Err(ServiceError::NotLoaded);
        };

        let now = Local::now();
        let input_features = request.to_feature_map(now);
        let row = pipeline.transform_for_inference(&input_features)?;
        let predictions = bundle
            .predict(&row)?
            .into_iter()
            .map(|(target, value)| (target_short_name(&target).to_string(), value))
            .collect();

        Ok(PredictResponse {
            predictions,
            input_features,
            timestamp: iso_timestamp(now),
        })
    }

    pub fn model_metadata(&self) -> Result<ModelMetadata> {
        let bundle = self.bundle.as_ref().ok_or(ServiceError::NotLoaded)?;
        Ok(ModelMetadata {
            model_type: MODEL_TYPE.to_string(),
            features: bundle.feature_names.clone(),
            targets: bundle.target_names.clone(),
            model_accuracy: bundle.accuracy.clone(),
            trained_at: bundle.trained_at,
        })
    }

    /// Importance scores for a target given by raw (`CO(GT)`) or short
    /// (`co`, `CO`) name. Returns the resolved raw name with the scores.
    pub fn feature_importance(&self, target: &str) -> Result<(String, Vec<FeatureScore>)> {
        let bundle = self.bundle.as_ref().ok_or(ServiceError::NotLoaded)?;
        let resolved = bundle
            .target_names
            .iter()
            .find(|name| {
                name.as_str() == target || target_short_name(name).eq_ignore_ascii_case(target)
            })
            .ok_or_else(|| ServiceError::UnknownTarget(target.to_string()))?;

        let scores = bundle
            .feature_importance(resolved)
            .into_iter()
            .map(|(feature, importance)| FeatureScore {
                feature,
                importance,
            })
            .collect();
        Ok((resolved.clone(), scores))
    }

    /// Path of the persisted bundle file.
    pub fn bundle_path(&self) -> PathBuf {
        self.model_dir.join(BUNDLE_FILE)
    }
}

fn stage(bundle: &ModelBundle, pipeline: &FeaturePipeline, staging: &Path) -> Result<()> {
    bundle.save(staging)?;
    pipeline.save(staging.join(PREPROCESSOR_FILE))?;
    Ok(())
}

fn promote(staging: &Path, model_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        fs::rename(entry.path(), model_dir.join(entry.file_name()))?;
    }
    Ok(())
}
