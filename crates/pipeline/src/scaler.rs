//! Standard scaler (z-score normalisation)
//!
//! `z = (x - mean) / std` with the population standard deviation. Constant
//! features keep a std of 1.0 so they map to zero instead of dividing by zero.
//! Statistics are frozen once fitted.

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    /// Fit on row-major data.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let n_samples = rows.len();
        if n_samples == 0 {
            return Err(PipelineError::Data(
                "cannot fit scaler on empty data".to_string(),
            ));
        }
        let n_features = rows[0].len();
        if rows.iter().any(|row| row.len() != n_features) {
            return Err(PipelineError::Data(
                "cannot fit scaler on ragged rows".to_string(),
            ));
        }

        let mut mean = vec![0.0; n_features];
        for row in rows {
            for (acc, &value) in mean.iter_mut().zip(row) {
                *acc += value;
            }
        }
        for value in &mut mean {
            *value /= n_samples as f64;
        }

        let mut var = vec![0.0; n_features];
        for row in rows {
            for ((acc, &value), &mu) in var.iter_mut().zip(row).zip(&mean) {
                let diff = value - mu;
                *acc += diff * diff;
            }
        }
        let std = var
            .into_iter()
            .map(|v| {
                let s = (v / n_samples as f64).sqrt();
                if s == 0.0 || !s.is_finite() {
                    1.0
                } else {
                    s
                }
            })
            .collect();

        Ok(Self { mean, std })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn std(&self) -> &[f64] {
        &self.std
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&x, (&mu, &s))| (x - mu) / s)
            .collect())
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.transform_row(row)).collect()
    }

    pub fn inverse_transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(&z, (&mu, &s))| z * s + mu)
            .collect())
    }

    pub fn inverse_transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|row| self.inverse_transform_row(row)).collect()
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features() {
            return Err(PipelineError::Data(format!(
                "scaler expects {} features, got {}",
                self.n_features(),
                width
            )));
        }
        Ok(())
    }
}
