//! Handler tests driving the router in-process.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use airq_dataset::{create_sample_dataset, DatasetProvider};
    use airq_model::MultiTargetTrainer;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::server::{build_router, AppState};
    use crate::service::ServiceCore;

    /// Points at a closed local port so downloads fail fast.
    const UNREACHABLE_URL: &str = "http://127.0.0.1:9/AirQualityUCI.zip";

    fn create_test_state(dir: &TempDir) -> AppState {
        let core = ServiceCore::new(dir.path().join("models"), MultiTargetTrainer::default());
        let datasets = DatasetProvider::new(dir.path().join("data"), UNREACHABLE_URL);
        AppState::new(core, datasets)
    }

    fn router(state: AppState) -> Router {
        build_router(Arc::new(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        send(app, Method::POST, uri, Body::from(body.to_string())).await
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Method::GET, uri, Body::empty()).await
    }

    #[tokio::test]
    async fn test_home_and_health() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(create_test_state(&dir));

        let (status, body) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert!(body["endpoints"]["/predict"].is_string());

        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_untrained_service_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(create_test_state(&dir));

        let (status, body) = get(&app, "/model-info").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Model not loaded");

        let (status, body) = post_json(&app, "/predict", json!({"co": 2.0})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap_or_default()
            .contains("train the model"));
    }

    #[tokio::test]
    async fn test_predict_rejects_empty_body() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(create_test_state(&dir));

        let (status, body) = send(&app, Method::POST, "/predict", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No data provided");

        let (status, _) = post_json(&app, "/predict", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/predict", Body::from("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_train_then_predict() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_sample_dataset(dir.path().join("data")).expect("sample dataset");
        let app = router(create_test_state(&dir));

        let (status, body) = post_json(&app, "/train", json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["message"], "Model trained successfully");
        for target in ["CO(GT)", "NO2(GT)", "C6H6(GT)"] {
            assert!(body["accuracy"][target]["r2"].is_number());
        }

        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], true);

        let (status, body) = post_json(
            &app,
            "/predict",
            json!({"co": 2.0, "temperature": 13.0, "humidity": "48.9"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        for short in ["CO", "NO2", "C6H6"] {
            assert!(body["predictions"][short].is_number(), "{short} missing");
        }
        assert_eq!(body["input_features"]["T"], 13.0);
        assert_eq!(body["input_features"]["NMHC(GT)"], Value::Null);

        let (status, body) = get(&app, "/model-info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targets"].as_array().map(Vec::len), Some(3));
        assert!(body["features"].as_array().is_some_and(|f| !f.is_empty()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_status_endpoints_answer_while_core_is_busy() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_sample_dataset(dir.path().join("data")).expect("sample dataset");
        let state = Arc::new(create_test_state(&dir));
        let app = build_router(state.clone());
        let (status, _) = post_json(&app, "/train", json!({})).await;
        assert_eq!(status, StatusCode::OK);

        // Stands in for a long training run holding the core.
        let _busy = state.core.lock().await;

        let (status, body) = tokio::time::timeout(Duration::from_secs(1), get(&app, "/health"))
            .await
            .expect("/health answers while the core is locked");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], true);

        let (status, body) =
            tokio::time::timeout(Duration::from_secs(1), get(&app, "/model-info"))
                .await
                .expect("/model-info answers while the core is locked");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targets"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_reloaded_model_is_reported_at_startup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = create_sample_dataset(dir.path().join("data")).expect("sample dataset");
        let models = dir.path().join("models");
        ServiceCore::new(&models, MultiTargetTrainer::default())
            .fit_pipeline_and_train(&dataset)
            .expect("training succeeds");

        let mut core = ServiceCore::new(&models, MultiTargetTrainer::default());
        assert_eq!(core.load_existing().expect("load"), (true, true));
        let datasets = DatasetProvider::new(dir.path().join("data"), UNREACHABLE_URL);
        let app = router(AppState::new(core, datasets));

        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], true);
        let (status, _) = get(&app, "/model-info").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_feature_importance_endpoint() {
        let dir = tempfile::tempdir().expect("tempdir");
        create_sample_dataset(dir.path().join("data")).expect("sample dataset");
        let app = router(create_test_state(&dir));
        let (status, _) = post_json(&app, "/train", json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(&app, "/feature-importance/CO").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["target"], "CO(GT)");
        let scores: Vec<f64> = body["importance"]
            .as_array()
            .expect("importance list")
            .iter()
            .filter_map(|entry| entry["importance"].as_f64())
            .collect();
        assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));

        let (status, _) = get(&app, "/feature-importance/O3").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_download_falls_back_to_sample() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(create_test_state(&dir));

        let (status, _) = get(&app, "/dataset-info").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = post_json(&app, "/download-dataset", json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["path"]
            .as_str()
            .unwrap_or_default()
            .ends_with("AirQualityUCI.csv"));

        let (status, body) = get(&app, "/dataset-info").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["shape"], json!([5, 15]));
        assert_eq!(body["sample_data"].as_array().map(Vec::len), Some(5));
    }
}
