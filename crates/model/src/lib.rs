//! AirQ Model - per-target gradient boosted regression
//!
//! Provides an exact-greedy gradient boosted tree regressor and the
//! multi-target bundle that trains, scores, persists and serves one model
//! (with its own feature scaler) per pollutant.

pub mod bundle;
pub mod cart;
pub mod deterministic;
pub mod errors;
pub mod gbdt;
pub mod metrics;
pub mod trainer;
pub mod tree;

pub use bundle::{target_file_stem, ModelBundle, BUNDLE_FILE};
pub use deterministic::{train_test_split, LcgRng, SplitTieBreaker};
pub use errors::ModelError;
pub use gbdt::{GbdtConfig, GbdtModel, GbdtTrainer};
pub use metrics::RegressionMetrics;
pub use trainer::{MultiTargetTrainer, TrainingParams, TRAINER_TARGETS};
pub use tree::{Node, Tree};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
