//! Fitted feature pipeline
//!
//! Freezes the feature column list and one scaler over all feature columns
//! at fit time. Training and inference both go through the frozen list, so
//! rows come out in the same order regardless of input key order.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::clean::{load_and_clean, median, MISSING_SENTINEL};
use crate::errors::{PipelineError, Result};
use crate::scaler::StandardScaler;
use crate::table::Table;

/// Target columns excluded from the preprocessor's features.
///
/// `PM10` is not part of the UCI schema; the trainer uses its own
/// three-target list.
pub const PREPROCESSOR_TARGETS: [&str; 4] = ["CO(GT)", "NO2(GT)", "C6H6(GT)", "PM10"];

/// Substitute for features absent from an inference request.
pub const MISSING_FEATURE_DEFAULT: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePipeline {
    target_names: Vec<String>,
    feature_names: Vec<String>,
    feature_scaler: Option<StandardScaler>,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FeaturePipeline {
    pub fn new() -> Self {
        Self {
            target_names: PREPROCESSOR_TARGETS.iter().map(|t| t.to_string()).collect(),
            feature_names: Vec::new(),
            feature_scaler: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.feature_scaler.is_some()
    }

    /// Read, clean and fit from a dataset file.
    pub fn fit<P: AsRef<Path>>(&mut self, source: P) -> Result<()> {
        info!("Fitting data preprocessor...");
        let table = load_and_clean(source)?;
        self.fit_table(&table)
    }

    /// Fit on an already cleaned table. State is only replaced on success.
    pub fn fit_table(&mut self, table: &Table) -> Result<()> {
        if table.is_empty() {
            return Err(PipelineError::Data(
                "cannot fit preprocessor on an empty dataset".to_string(),
            ));
        }

        let feature_names: Vec<String> = table
            .columns
            .iter()
            .filter(|column| !self.target_names.contains(column))
            .cloned()
            .collect();
        if feature_names.is_empty() {
            return Err(PipelineError::Data(
                "dataset has no feature columns".to_string(),
            ));
        }

        let features = table.select(&feature_names)?;
        let scaler = StandardScaler::fit(&features.rows)?;

        self.feature_names = feature_names;
        self.feature_scaler = Some(scaler);
        info!(
            "Data preprocessor fitted successfully. Features: {}",
            self.feature_names.len()
        );
        Ok(())
    }

    fn scaler(&self) -> Result<&StandardScaler> {
        self.feature_scaler.as_ref().ok_or_else(|| {
            PipelineError::NotFitted("call fit() before transforming data".to_string())
        })
    }

    /// Scaled feature rows plus the preprocessor targets present in `table`.
    ///
    /// Leftover sentinel values are median filled per column first.
    pub fn transform_for_training(&self, table: &Table) -> Result<(Vec<Vec<f64>>, Table)> {
        let scaler = self.scaler()?;
        let filled = fill_sentinels_with_median(table);

        let features = filled.select(&self.feature_names)?;
        let scaled = scaler.transform(&features.rows)?;

        let present_targets: Vec<String> = self
            .target_names
            .iter()
            .filter(|target| {
                let present = filled.has_column(target);
                if !present {
                    warn!("Target column '{}' not present in training data", target);
                }
                present
            })
            .cloned()
            .collect();
        let targets = filled.select(&present_targets)?;

        Ok((scaled, targets))
    }

    /// Build one scaled row from a loosely typed mapping.
    ///
    /// Absent features become [`MISSING_FEATURE_DEFAULT`], values that do not
    /// coerce to a number become 0. Keys outside the feature list are ignored.
    pub fn transform_for_inference(&self, input: &BTreeMap<String, Value>) -> Result<Vec<f64>> {
        let scaler = self.scaler()?;

        let missing: Vec<&str> = self
            .feature_names
            .iter()
            .filter(|name| !input.contains_key(*name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!("Missing columns: {:?}", missing);
        }

        let row: Vec<f64> = self
            .feature_names
            .iter()
            .map(|name| {
                input
                    .get(name)
                    .map(coerce_numeric)
                    .unwrap_or(MISSING_FEATURE_DEFAULT)
            })
            .collect();

        scaler.transform_row(&row)
    }

    pub fn inverse_transform_features(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.scaler()?.inverse_transform(rows)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.feature_names.clone()
    }

    pub fn target_names(&self) -> Vec<String> {
        self.target_names.clone()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bincode::serialize(self)?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

/// Numeric coercion for request values.
pub fn coerce_numeric(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.filter(|v| !v.is_nan()).unwrap_or(0.0)
}

fn fill_sentinels_with_median(table: &Table) -> Table {
    let mut rows = table.rows.clone();
    for col in 0..table.width() {
        let column: Vec<Option<f64>> = rows
            .iter()
            .map(|row| Some(row[col]).filter(|v| *v != MISSING_SENTINEL && !v.is_nan()))
            .collect();
        if column.iter().all(Option::is_some) {
            continue;
        }
        if let Some(fill) = median(&column) {
            for (row, value) in rows.iter_mut().zip(column) {
                row[col] = value.unwrap_or(fill);
            }
        }
    }
    Table::new(table.columns.clone(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cleaned() -> Table {
        Table::new(
            vec!["CO(GT)".into(), "T".into(), "RH".into(), "hour".into()],
            vec![
                vec![2.6, 13.6, 48.9, 18.0],
                vec![2.0, 13.3, 47.7, 19.0],
                vec![2.2, 11.9, 54.0, 20.0],
            ],
        )
    }

    #[test]
    fn test_not_fitted() {
        let pipeline = FeaturePipeline::new();
        assert!(matches!(
            pipeline.transform_for_inference(&BTreeMap::new()),
            Err(PipelineError::NotFitted(_))
        ));
        assert!(matches!(
            pipeline.transform_for_training(&cleaned()),
            Err(PipelineError::NotFitted(_))
        ));
    }

    #[test]
    fn test_feature_list_excludes_targets() {
        let mut pipeline = FeaturePipeline::new();
        pipeline.fit_table(&cleaned()).unwrap();
        assert_eq!(pipeline.feature_names(), vec!["T", "RH", "hour"]);
        assert_eq!(pipeline.target_names().len(), 4);
    }

    #[test]
    fn test_inference_order_and_defaults() {
        let mut pipeline = FeaturePipeline::new();
        pipeline.fit_table(&cleaned()).unwrap();

        let mut input = BTreeMap::new();
        input.insert("hour".to_string(), json!("19"));
        input.insert("T".to_string(), json!(13.3));
        input.insert("unused".to_string(), json!(1.0));

        let row = pipeline.transform_for_inference(&input).unwrap();
        let raw = pipeline.inverse_transform_features(&[row]).unwrap();
        assert!((raw[0][0] - 13.3).abs() < 1e-9);
        assert!(raw[0][1].abs() < 1e-9);
        assert!((raw[0][2] - 19.0).abs() < 1e-9);
    }

    #[test]
    fn test_training_transform_skips_absent_targets() {
        let mut pipeline = FeaturePipeline::new();
        pipeline.fit_table(&cleaned()).unwrap();

        let (features, targets) = pipeline.transform_for_training(&cleaned()).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].len(), 3);
        assert_eq!(targets.columns, vec!["CO(GT)"]);
    }

    #[test]
    fn test_training_transform_fills_sentinels() {
        let mut pipeline = FeaturePipeline::new();
        pipeline.fit_table(&cleaned()).unwrap();

        let mut table = cleaned();
        table.rows[0][1] = MISSING_SENTINEL;
        let (features, _) = pipeline.transform_for_training(&table).unwrap();
        let restored = pipeline.inverse_transform_features(&features).unwrap();
        // Median of 13.3 and 11.9
        assert!((restored[0][0] - 12.6).abs() < 1e-9);
    }

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(coerce_numeric(&json!(2.5)), 2.5);
        assert_eq!(coerce_numeric(&json!(" 4 ")), 4.0);
        assert_eq!(coerce_numeric(&json!("abc")), 0.0);
        assert_eq!(coerce_numeric(&json!(null)), 0.0);
        assert_eq!(coerce_numeric(&json!(true)), 1.0);
        assert_eq!(coerce_numeric(&json!([1, 2])), 0.0);
    }

    #[test]
    fn test_save_and_load() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut pipeline = FeaturePipeline::new();
        pipeline.fit_table(&cleaned())?;

        let path = dir.path().join("preprocessor.bin");
        pipeline.save(&path)?;
        let restored = FeaturePipeline::load(&path)?;
        assert_eq!(restored, pipeline);
        Ok(())
    }
}
