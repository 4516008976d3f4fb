use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::alerts::AlertThresholds;
use crate::error::PredictError;
use crate::features::{build_features, FeatureVector};
use crate::metrics::Registry;
use crate::service::{PredictionService, ServiceState};
use crate::types::{Prediction, PredictionRecord, PredictionRequest};

// ---------- Request/Response types ----------

#[derive(Deserialize, Debug)]
pub struct BatchIn {
    pub records: Vec<PredictionRequest>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PredictOut {
    pub co_prediction: f64,
    pub timestamp: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

// One entry per batch record, same order as the request
#[derive(Serialize, Deserialize, Debug)]
#[serde(untagged)]
pub enum BatchItem {
    Scored { prediction: f64, timestamp: String },
    Failed { error: ErrorBody },
}

impl From<&PredictError> for ErrorBody {
    fn from(e: &PredictError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub svc: Arc<PredictionService>,
    pub metrics: Arc<Registry>,
    pub alerts: Arc<AlertThresholds>,
    pub log_pred: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .route("/batch-predict", post(batch_predict))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn status_for(e: &PredictError) -> StatusCode {
    match e {
        PredictError::InputParse { .. } => StatusCode::BAD_REQUEST,
        PredictError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PredictError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        PredictError::Inference(_)
        | PredictError::ModelLoad { .. }
        | PredictError::AlreadyLoaded => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(e: PredictError) -> (StatusCode, Json<serde_json::Value>) {
    (status_for(&e), Json(json!({ "error": ErrorBody::from(&e) })))
}

// Log row for the dashboards, plus any threshold breaches.
fn observe(state: &AppState, req: &PredictionRequest, pred: &Prediction) {
    let rec = PredictionRecord::new(req, pred);
    tracing::info!(
        target: "prediction_log",
        timestamp = %rec.timestamp.to_rfc3339(),
        prediction = rec.prediction,
        latency = rec.latency,
        temperature = rec.temperature,
        humidity = rec.humidity,
        nox = rec.nox,
        "prediction"
    );
    for alert in state.alerts.check(&rec) {
        tracing::warn!("{}", alert);
    }
}

// Debug signal so we can confirm the vector looks sane
fn log_vector(fv: &FeatureVector) {
    let v = fv.to_array();
    let n = v.len() as f64;
    let mean = v.iter().sum::<f64>() / n;
    let std = (v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt();
    let sample: Vec<String> = fv
        .named()
        .skip(9)
        .map(|(name, x)| format!("{}={:.3}", name, x))
        .collect();
    tracing::info!(
        "features in_dim={} mean={:.3} std={:.3} live=[{}]",
        v.len(),
        mean,
        std,
        sample.join(", ")
    );
}

// ---------- Handlers ----------

async fn home(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = match state.svc.state() {
        ServiceState::Ready => "active",
        ServiceState::Unloaded => "loading",
    };
    Json(json!({ "message": "Air Quality Prediction API", "status": status }))
}

async fn predict(
    State(state): State<AppState>,
    Json(payload): Json<PredictionRequest>,
) -> Result<Json<PredictOut>, (StatusCode, Json<serde_json::Value>)> {
    let fv = build_features(&payload).map_err(reject)?;
    if state.log_pred {
        log_vector(&fv);
    }

    let pred = state.svc.predict_one(&fv).map_err(reject)?;
    observe(&state, &payload, &pred);

    Ok(Json(PredictOut {
        co_prediction: pred.value,
        timestamp: pred.timestamp.to_rfc3339(),
    }))
}

// Inference is CPU-bound; the whole batch runs off the async workers.
async fn batch_predict(
    State(state): State<AppState>,
    Json(payload): Json<BatchIn>,
) -> Result<Json<Vec<BatchItem>>, (StatusCode, Json<serde_json::Value>)> {
    let svc = state.svc.clone();
    let records = payload.records;
    let (records, results) = tokio::task::spawn_blocking(move || {
        let results = svc.predict_batch(&records);
        (records, results)
    })
    .await
    .map_err(|e| reject(PredictError::Inference(format!("batch worker failed: {}", e))))?;

    let out = records
        .iter()
        .zip(results)
        .enumerate()
        .map(|(i, (req, res))| match res {
            Ok(pred) => {
                observe(&state, req, &pred);
                BatchItem::Scored {
                    prediction: pred.value,
                    timestamp: pred.timestamp.to_rfc3339(),
                }
            }
            Err(e) => {
                tracing::warn!("batch record {} failed: {}", i, e);
                BatchItem::Failed {
                    error: ErrorBody::from(&e),
                }
            }
        })
        .collect();
    Ok(Json(out))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
