use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    engine::SharedClassifier,
    error::{validation_error, AppError},
    features::{FeatureExtractor, FeatureSource},
    types::{AboutResponse, HealthResponse, PredictInput, PredictResponse},
};

#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<SharedClassifier>,
    pub extractor: Arc<dyn FeatureSource>,
}

impl AppState {
    pub fn new(classifier: SharedClassifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
            extractor: Arc::new(FeatureExtractor::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureSource>) -> Self {
        self.extractor = extractor;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE]),
        );

    Router::new()
        .nest("/api", api)
        .route("/about", get(about))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    let start = Instant::now();
    metrics::counter!("predict_requests_total").increment(1);

    let result = run_predict(&state, payload).await;

    let latency = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("predict_duration_ms").record(latency);

    match &result {
        Ok(response) => {
            metrics::counter!("predictions_total", "label" => response.label.clone()).increment(1);
            info!(
                "Prediction {} (confidence {:.3}) in {:.2}ms",
                response.label, response.confidence, latency
            );
        }
        Err(e) => {
            metrics::counter!("predict_errors_total", "kind" => e.kind()).increment(1);
            warn!("Prediction rejected: {}", e);
        }
    }

    result.map(Json)
}

async fn run_predict(
    state: &AppState,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<PredictResponse, AppError> {
    let Json(body) = payload.map_err(|e| validation_error(format!("Request must be JSON: {}", e)))?;
    let input = PredictInput::try_from(body)?;

    let classifier = state.classifier.get().await;
    let response = classifier.classify_input(input, state.extractor.as_ref())?;
    Ok(response)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let health = state.classifier.get().await.health();
    let status = if health.model_loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

pub async fn about(State(state): State<AppState>) -> Json<AboutResponse> {
    Json(state.classifier.get().await.describe())
}
