//! Request and response bodies of the REST API

use std::collections::BTreeMap;

use airq_model::RegressionMetrics;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /predict`.
///
/// Every key is optional. Sensor values may be numbers or numeric strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub co: Option<Value>,
    pub pt08_s1: Option<Value>,
    pub nmhc: Option<Value>,
    pub c6h6: Option<Value>,
    pub pt08_s2: Option<Value>,
    pub nox: Option<Value>,
    pub pt08_s3: Option<Value>,
    pub no2: Option<Value>,
    pub pt08_s4: Option<Value>,
    pub pt08_s5: Option<Value>,
    pub temperature: Option<Value>,
    pub humidity: Option<Value>,
    pub absolute_humidity: Option<Value>,
}

impl PredictRequest {
    /// Map request keys onto the raw dataset columns.
    ///
    /// `date`/`time` default to `now`; absent sensor readings become null.
    pub fn to_feature_map(&self, now: DateTime<Local>) -> BTreeMap<String, Value> {
        let date = self
            .date
            .clone()
            .unwrap_or_else(|| now.format("%Y-%m-%d").to_string());
        let time = self
            .time
            .clone()
            .unwrap_or_else(|| now.format("%H:%M:%S").to_string());

        let sensors = [
            ("CO(GT)", &self.co),
            ("PT08.S1(CO)", &self.pt08_s1),
            ("NMHC(GT)", &self.nmhc),
            ("C6H6(GT)", &self.c6h6),
            ("PT08.S2(NMHC)", &self.pt08_s2),
            ("NOx(GT)", &self.nox),
            ("PT08.S3(NOx)", &self.pt08_s3),
            ("NO2(GT)", &self.no2),
            ("PT08.S4(NO2)", &self.pt08_s4),
            ("PT08.S5(O3)", &self.pt08_s5),
            ("T", &self.temperature),
            ("RH", &self.humidity),
            ("AH", &self.absolute_humidity),
        ];

        let mut features = BTreeMap::new();
        features.insert("Date".to_string(), Value::String(date));
        features.insert("Time".to_string(), Value::String(time));
        for (column, value) in sensors {
            features.insert(column.to_string(), value.clone().unwrap_or(Value::Null));
        }
        features
    }
}

/// Short pollutant name used in responses: `CO(GT)` -> `CO`.
pub fn target_short_name(target: &str) -> &str {
    target.split('(').next().unwrap_or(target)
}

/// Local time without offset, microsecond precision.
pub fn iso_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Keyed by short pollutant name
    pub predictions: BTreeMap<String, f64>,
    pub input_features: BTreeMap<String, Value>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainResponse {
    pub message: String,
    pub accuracy: BTreeMap<String, RegressionMetrics>,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub message: String,
    pub path: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub model_loaded: bool,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HomeResponse {
    pub message: String,
    pub status: String,
    pub version: String,
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: String,
    pub features: Vec<String>,
    pub targets: Vec<String>,
    pub model_accuracy: BTreeMap<String, RegressionMetrics>,
    /// Unix seconds of the training run
    pub trained_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScore {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeatureImportanceResponse {
    pub target: String,
    pub importance: Vec<FeatureScore>,
}
