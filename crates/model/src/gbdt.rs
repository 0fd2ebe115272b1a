//! Gradient Boosted Decision Tree (GBDT) regressor
//!
//! Squared-error boosting: the model starts from the target mean and each
//! round fits a CART tree to the residual gradients, added with the
//! learning rate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cart::{presort_features, CartBuilder, TreeConfig};
use crate::errors::{ModelError, Result};
use crate::tree::Tree;

/// GBDT training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub reg_lambda: f64,
    pub gamma: f64,
}

impl Default for GbdtConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            gamma: 0.0,
        }
    }
}

impl GbdtConfig {
    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_child_weight: self.min_child_weight,
            reg_lambda: self.reg_lambda,
            gamma: self.gamma,
        }
    }
}

/// Trained boosted ensemble
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub base_score: f64,
    pub learning_rate: f64,
    pub feature_count: usize,
    pub trees: Vec<Tree>,
}

impl GbdtModel {
    /// Predict one row. Fails when the row width differs from training.
    pub fn predict_row(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.feature_count {
            return Err(ModelError::FeatureMismatch {
                expected: self.feature_count,
                actual: features.len(),
            });
        }
        Ok(self.raw_predict(features))
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }

    fn raw_predict(&self, features: &[f64]) -> f64 {
        self.trees.iter().fold(self.base_score, |acc, tree| {
            acc + self.learning_rate * tree.evaluate(features)
        })
    }

    /// Average split gain per feature, normalised to sum to 1.
    ///
    /// Features never used in a split score 0; all zeros when no tree split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total_gain = vec![0.0; self.feature_count];
        let mut split_count = vec![0usize; self.feature_count];
        for node in self.trees.iter().flat_map(|tree| &tree.nodes) {
            if node.is_leaf() {
                continue;
            }
            if let Some(idx) = usize::try_from(node.feature_idx)
                .ok()
                .filter(|&idx| idx < self.feature_count)
            {
                total_gain[idx] += node.gain;
                split_count[idx] += 1;
            }
        }

        let average: Vec<f64> = total_gain
            .iter()
            .zip(&split_count)
            .map(|(&gain, &count)| if count == 0 { 0.0 } else { gain / count as f64 })
            .collect();
        let sum: f64 = average.iter().sum();
        if sum <= 0.0 {
            return vec![0.0; self.feature_count];
        }
        average.into_iter().map(|v| v / sum).collect()
    }
}

/// GBDT trainer
pub struct GbdtTrainer {
    config: GbdtConfig,
}

impl GbdtTrainer {
    pub fn new(config: GbdtConfig) -> Self {
        Self { config }
    }

    /// Train a GBDT model on row-major features and one target column
    pub fn train(&self, features: &[Vec<f64>], targets: &[f64]) -> Result<GbdtModel> {
        let n_samples = features.len();
        if n_samples == 0 {
            return Err(ModelError::Training("no training rows".to_string()));
        }
        if targets.len() != n_samples {
            return Err(ModelError::Training(format!(
                "{} feature rows but {} targets",
                n_samples,
                targets.len()
            )));
        }
        let feature_count = features[0].len();
        if features.iter().any(|row| row.len() != feature_count) {
            return Err(ModelError::Training("ragged feature rows".to_string()));
        }
        if features.iter().flatten().chain(targets).any(|v| !v.is_finite()) {
            return Err(ModelError::Training(
                "training data contains non-finite values".to_string(),
            ));
        }

        let base_score = targets.iter().sum::<f64>() / n_samples as f64;
        let mut predictions = vec![base_score; n_samples];
        let presorted = presort_features(features, feature_count);
        let hessians = vec![1.0; n_samples];
        let tree_config = self.config.tree_config();

        let mut trees = Vec::with_capacity(self.config.n_estimators);
        for tree_idx in 0..self.config.n_estimators {
            let gradients = Self::calculate_gradients(targets, &predictions);

            let builder = CartBuilder::new(
                features,
                &gradients,
                &hessians,
                &presorted,
                tree_config.clone(),
            );
            let tree = builder.build();

            for (pred, row) in predictions.iter_mut().zip(features) {
                *pred += self.config.learning_rate * tree.evaluate(row);
            }
            debug!(
                "Tree {}/{}: {} nodes",
                tree_idx + 1,
                self.config.n_estimators,
                tree.nodes.len()
            );
            trees.push(tree);
        }

        Ok(GbdtModel {
            base_score,
            learning_rate: self.config.learning_rate,
            feature_count,
            trees,
        })
    }

    /// Squared-error gradient: prediction - target (hessian is constant 1)
    fn calculate_gradients(targets: &[f64], predictions: &[f64]) -> Vec<f64> {
        predictions
            .iter()
            .zip(targets)
            .map(|(pred, target)| pred - target)
            .collect()
    }
}
