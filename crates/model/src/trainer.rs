//! Multi-target trainer
//!
//! Splits the cleaned table once, then fits an independent scaler and
//! booster per pollutant on the same training rows and scores each on the
//! held-out rows.

use std::collections::BTreeMap;
use std::path::Path;

use airq_pipeline::{load_and_clean, StandardScaler, Table};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bundle::ModelBundle;
use crate::deterministic::train_test_split;
use crate::errors::{ModelError, Result};
use crate::gbdt::{GbdtConfig, GbdtTrainer};
use crate::metrics::RegressionMetrics;

/// Pollutants the trainer fits one model for
pub const TRAINER_TARGETS: [&str; 3] = ["CO(GT)", "NO2(GT)", "C6H6(GT)"];

/// Hyperparameters of a training run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub gbdt: GbdtConfig,
    /// Share of rows held out for scoring
    pub test_size: f64,
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            gbdt: GbdtConfig::default(),
            test_size: 0.2,
            seed: 42,
        }
    }
}

/// Trains a [`ModelBundle`] from a cleaned table
#[derive(Clone, Debug)]
pub struct MultiTargetTrainer {
    params: TrainingParams,
    target_names: Vec<String>,
}

impl MultiTargetTrainer {
    pub fn new(params: TrainingParams) -> Self {
        Self {
            params,
            target_names: TRAINER_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    /// Split a cleaned table into (features, targets).
    ///
    /// Features are all non-target columns in table order.
    pub fn prepare_features(&self, table: &Table) -> Result<(Table, Table)> {
        if let Some(missing) = self.target_names().iter().find(|t| !table.has_column(t)) {
            return Err(ModelError::Training(format!(
                "target column '{missing}' not found in data"
            )));
        }

        let feature_names: Vec<String> = table
            .columns
            .iter()
            .filter(|column| !self.target_names.contains(*column))
            .cloned()
            .collect();

        Ok((
            table.select(&feature_names)?,
            table.select(&self.target_names)?,
        ))
    }

    /// Train one model per target column.
    ///
    /// Every target shares the same seeded split. Fails as a whole if any
    /// target fails.
    pub fn train(&self, features: &Table, targets: &Table) -> Result<ModelBundle> {
        if features.is_empty() {
            return Err(ModelError::Training("no rows to train on".to_string()));
        }
        if features.len() != targets.len() {
            return Err(ModelError::Training(format!(
                "{} feature rows but {} target rows",
                features.len(),
                targets.len()
            )));
        }
        if features.width() == 0 {
            return Err(ModelError::Training("no feature columns".to_string()));
        }

        let (train_idx, test_idx) =
            train_test_split(features.len(), self.params.test_size, self.params.seed);
        let x_train = features.take_rows(&train_idx).rows;
        let x_test = features.take_rows(&test_idx).rows;

        info!(
            "Training on {} rows, scoring on {} rows, {} features",
            x_train.len(),
            x_test.len(),
            features.width()
        );

        let booster = GbdtTrainer::new(self.params.gbdt.clone());
        let mut models = BTreeMap::new();
        let mut scalers = BTreeMap::new();
        let mut accuracy = BTreeMap::new();

        for (target_idx, target) in targets.columns.iter().enumerate() {
            info!("Training model for {}", target);

            let y_train: Vec<f64> = train_idx.iter().map(|&i| targets.rows[i][target_idx]).collect();
            let y_test: Vec<f64> = test_idx.iter().map(|&i| targets.rows[i][target_idx]).collect();

            let scaler = StandardScaler::fit(&x_train).map_err(|e| training_error(target, e))?;
            let train_scaled = scaler.transform(&x_train).map_err(|e| training_error(target, e))?;
            let test_scaled = scaler.transform(&x_test).map_err(|e| training_error(target, e))?;

            let model = booster.train(&train_scaled, &y_train)?;
            let y_pred = model.predict(&test_scaled)?;
            let metrics = RegressionMetrics::compute(&y_test, &y_pred);

            info!("{} - R²: {:.4}, RMSE: {:.4}", target, metrics.r2, metrics.rmse);

            models.insert(target.clone(), model);
            scalers.insert(target.clone(), scaler);
            accuracy.insert(target.clone(), metrics);
        }

        Ok(ModelBundle {
            models,
            scalers,
            feature_names: features.columns.clone(),
            target_names: targets.columns.clone(),
            accuracy,
            params: self.params.clone(),
            trained_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Load, clean and train from a dataset file.
    pub fn train_from_path<P: AsRef<Path>>(&self, path: P) -> Result<ModelBundle> {
        let run = || -> Result<ModelBundle> {
            let table = load_and_clean(path.as_ref())?;
            let (features, targets) = self.prepare_features(&table)?;
            self.train(&features, &targets)
        };
        run().map_err(|e| match e {
            ModelError::Training(_) => e,
            other => ModelError::Training(other.to_string()),
        })
    }
}

impl Default for MultiTargetTrainer {
    fn default() -> Self {
        Self::new(TrainingParams::default())
    }
}

fn training_error(target: &str, err: impl std::fmt::Display) -> ModelError {
    ModelError::Training(format!("{target}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_table(n: usize) -> Table {
        let columns = ["CO(GT)", "T", "NO2(GT)", "RH", "C6H6(GT)", "hour"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = (0..n)
            .map(|i| {
                let t = i as f64;
                let rh = ((i * 13) % 17) as f64;
                vec![0.1 * t + 1.0, t, 2.0 * rh + 5.0, rh, 0.5 * t, (i % 24) as f64]
            })
            .collect();
        Table::new(columns, rows)
    }

    fn quick_trainer() -> MultiTargetTrainer {
        MultiTargetTrainer::default()
    }

    #[test]
    fn test_prepare_features_excludes_targets() -> Result<()> {
        let table = synthetic_table(10);
        let (features, targets) = quick_trainer().prepare_features(&table)?;
        assert_eq!(features.columns, vec!["T", "RH", "hour"]);
        assert_eq!(targets.columns, TRAINER_TARGETS.to_vec());
        assert_eq!(features.len(), 10);
        Ok(())
    }

    #[test]
    fn test_prepare_features_requires_targets() {
        let table = Table::new(vec!["T".into()], vec![vec![1.0]]);
        assert!(matches!(
            quick_trainer().prepare_features(&table),
            Err(ModelError::Training(_))
        ));
    }

    #[test]
    fn test_train_one_model_per_target() -> Result<()> {
        let trainer = quick_trainer();
        let (features, targets) = trainer.prepare_features(&synthetic_table(60))?;
        let bundle = trainer.train(&features, &targets)?;

        assert_eq!(bundle.models.len(), 3);
        assert_eq!(bundle.scalers.len(), 3);
        assert_eq!(bundle.feature_names, features.columns);
        for target in TRAINER_TARGETS {
            let metrics = bundle.accuracy[target];
            assert!(metrics.is_finite());
            assert!(metrics.r2 > 0.5, "{target} r2 = {}", metrics.r2);
        }
        Ok(())
    }

    #[test]
    fn test_train_rejects_empty() {
        let trainer = quick_trainer();
        let features = Table::new(vec!["T".into()], vec![]);
        let targets = Table::new(vec!["CO(GT)".into()], vec![]);
        assert!(matches!(
            trainer.train(&features, &targets),
            Err(ModelError::Training(_))
        ));
    }

    #[test]
    fn test_train_from_missing_file_is_training_error() {
        let result = quick_trainer().train_from_path("/nonexistent/AirQualityUCI.csv");
        assert!(matches!(result, Err(ModelError::Training(_))));
    }
}
