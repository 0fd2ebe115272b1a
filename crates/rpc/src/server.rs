use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use airq_dataset::{dataset_info, DatasetInfo, DatasetProvider};
use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::errors::ServiceError;
use crate::service::ServiceCore;
use crate::types::{
    iso_timestamp, DownloadResponse, FeatureImportanceResponse, HealthResponse, HomeResponse,
    ModelMetadata, PredictRequest, PredictResponse, TrainResponse,
};

#[derive(Clone)]
pub struct AppState {
    /// Train and predict take this lock, so they never overlap. Blocking
    /// work locks it with `blocking_lock` inside `spawn_blocking`.
    pub core: Arc<Mutex<ServiceCore>>,
    /// Metadata of the serving bundle, replaced only after a successful
    /// training run. Readers never wait on the core lock.
    pub metadata: Arc<RwLock<Option<ModelMetadata>>>,
    pub datasets: DatasetProvider,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(core: ServiceCore, datasets: DatasetProvider) -> Self {
        let metadata = core.model_metadata().ok();
        Self {
            core: Arc::new(Mutex::new(core)),
            metadata: Arc::new(RwLock::new(metadata)),
            datasets,
            start_time: Instant::now(),
        }
    }

    fn model_loaded(&self) -> bool {
        self.metadata.read().is_some()
    }

    fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Map a core failure, prefixing unexpected errors with `context`.
    fn from_service(context: &str, err: ServiceError) -> Self {
        match err {
            ServiceError::NotLoaded => {
                Self::internal("Model not loaded. Please train the model first.")
            }
            ServiceError::UnknownTarget(target) => {
                Self::not_found(format!("unknown target '{target}'"))
            }
            other => {
                error!("{}: {}", context, other);
                Self::internal(format!("{context}: {other}"))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!("REST API listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("REST server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind REST listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind REST listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handle_home))
        .route("/health", get(handle_health))
        .route("/model-info", get(handle_model_info))
        .route("/predict", post(handle_predict))
        .route("/train", post(handle_train))
        .route("/download-dataset", post(handle_download_dataset))
        .route("/feature-importance/:target", get(handle_feature_importance))
        .route("/dataset-info", get(handle_dataset_info))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn handle_home() -> Json<HomeResponse> {
    let endpoints = [
        ("/predict", "POST - Make predictions"),
        ("/train", "POST - Train models on the dataset"),
        ("/download-dataset", "POST - Fetch the dataset"),
        ("/health", "GET - Check API health"),
        ("/model-info", "GET - Get model information"),
        ("/feature-importance/:target", "GET - Feature importance for a target"),
        ("/dataset-info", "GET - Summary of the cached dataset"),
    ]
    .into_iter()
    .map(|(path, description)| (path.to_string(), description.to_string()))
    .collect();

    Json(HomeResponse {
        message: "Air Quality Prediction API".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
    })
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: iso_timestamp(Local::now()),
        model_loaded: state.model_loaded(),
        uptime_secs: state.uptime_secs(),
    })
}

async fn handle_model_info(
    State(state): State<SharedState>,
) -> Result<Json<ModelMetadata>, ApiError> {
    state
        .metadata
        .read()
        .clone()
        .map(Json)
        .ok_or_else(|| ApiError::internal("Model not loaded"))
}

async fn handle_predict(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let request = parse_predict_body(&body)?;

    let core = state.core.clone();
    let response = tokio::task::spawn_blocking(move || core.blocking_lock().predict_one(&request))
        .await
        .map_err(|err| ApiError::internal(format!("prediction task failed: {err}")))?
        .map_err(|err| ApiError::from_service("Prediction failed", err))?;

    Ok(Json(response))
}

/// An absent, null or empty JSON object body is rejected.
fn parse_predict_body(body: &[u8]) -> Result<PredictRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ApiError::bad_request("No data provided"));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("invalid JSON body: {err}")))?;
    match &value {
        Value::Null => return Err(ApiError::bad_request("No data provided")),
        Value::Object(map) if map.is_empty() => {
            return Err(ApiError::bad_request("No data provided"))
        }
        _ => {}
    }
    serde_json::from_value(value)
        .map_err(|err| ApiError::bad_request(format!("invalid prediction request: {err}")))
}

async fn handle_train(State(state): State<SharedState>) -> Result<Json<TrainResponse>, ApiError> {
    let dataset = state
        .datasets
        .get_dataset_path()
        .await
        .map_err(|err| ApiError::from_service("Training failed", err.into()))?;

    let core = state.core.clone();
    let (accuracy, metadata) = tokio::task::spawn_blocking(move || {
        let mut core = core.blocking_lock();
        let accuracy = core.fit_pipeline_and_train(&dataset)?;
        Ok::<_, ServiceError>((accuracy, core.model_metadata()?))
    })
    .await
    .map_err(|err| ApiError::internal(format!("training task failed: {err}")))?
    .map_err(|err| ApiError::from_service("Training failed", err))?;
    *state.metadata.write() = Some(metadata);

    Ok(Json(TrainResponse {
        message: "Model trained successfully".to_string(),
        accuracy,
        timestamp: iso_timestamp(Local::now()),
    }))
}

async fn handle_download_dataset(
    State(state): State<SharedState>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let path = state
        .datasets
        .get_dataset_path()
        .await
        .map_err(|err| ApiError::from_service("Dataset download failed", err.into()))?;

    Ok(Json(DownloadResponse {
        message: "Dataset downloaded successfully".to_string(),
        path: path.display().to_string(),
        timestamp: iso_timestamp(Local::now()),
    }))
}

async fn handle_feature_importance(
    State(state): State<SharedState>,
    AxumPath(target): AxumPath<String>,
) -> Result<Json<FeatureImportanceResponse>, ApiError> {
    let (target, importance) = state
        .core
        .lock()
        .await
        .feature_importance(&target)
        .map_err(|err| ApiError::from_service("Feature importance failed", err))?;

    Ok(Json(FeatureImportanceResponse { target, importance }))
}

async fn handle_dataset_info(
    State(state): State<SharedState>,
) -> Result<Json<DatasetInfo>, ApiError> {
    let path = state.datasets.dataset_path();
    if !path.exists() {
        return Err(ApiError::not_found(
            "Dataset not found. Download it first via /download-dataset.",
        ));
    }

    let info = tokio::task::spawn_blocking(move || dataset_info(&path))
        .await
        .map_err(|err| ApiError::internal(format!("dataset task failed: {err}")))?
        .map_err(|err| ApiError::from_service("Dataset info failed", err.into()))?;

    Ok(Json(info))
}
