//! Held-out regression metrics

use serde::{Deserialize, Serialize};

/// Scores of one target's model on the test split
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    /// Score predictions against the true values.
    ///
    /// R² falls back to 1.0 (perfect fit) or 0.0 when it is undefined: fewer
    /// than two rows or a constant target. An empty input scores all zeros.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self::default();
        }
        let pairs = || y_true.iter().zip(y_pred).take(n);

        let ss_res: f64 = pairs().map(|(t, p)| (t - p).powi(2)).sum();
        let abs_err: f64 = pairs().map(|(t, p)| (t - p).abs()).sum();
        let mse = ss_res / n as f64;
        let mae = abs_err / n as f64;

        let mean = y_true[..n].iter().sum::<f64>() / n as f64;
        let ss_tot: f64 = y_true[..n].iter().map(|t| (t - mean).powi(2)).sum();

        let r2 = if n < 2 || ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.mse.is_finite() && self.rmse.is_finite() && self.mae.is_finite() && self.r2.is_finite()
    }
}
