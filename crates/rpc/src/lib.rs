//! AirQ RPC - REST facade over the feature pipeline and the model bundle
//!
//! Handlers translate JSON requests into calls on [`ServiceCore`], which owns
//! the fitted pipeline and the trained bundle behind a single lock.

pub mod errors;
pub mod server;
pub mod service;
pub mod types;

#[cfg(test)]
mod server_tests;

pub use errors::ServiceError;
pub use server::{build_router, start_server, AppState};
pub use service::{ServiceCore, PREPROCESSOR_FILE};
pub use types::{PredictRequest, PredictResponse};
