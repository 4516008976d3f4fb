use chrono::Utc;
use std::{
    path::Path,
    sync::{Arc, OnceLock},
    time::Instant,
};

use crate::error::PredictError;
use crate::features::{build_features, FeatureVector};
use crate::metrics::{MetricsSink, CO_LEVEL, PREDICTIONS_TOTAL, PREDICTION_LATENCY};
use crate::model::{self, Regressor};
use crate::types::{Prediction, PredictionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unloaded,
    Ready,
}

/// Owns the loaded regressor for the life of the process.
///
/// Starts `Unloaded`; a successful `load_model` moves it to `Ready` for good.
pub struct PredictionService {
    model: OnceLock<Arc<dyn Regressor>>,
    metrics: Arc<dyn MetricsSink>,
}

impl PredictionService {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            model: OnceLock::new(),
            metrics,
        }
    }

    pub fn with_model(model: Arc<dyn Regressor>, metrics: Arc<dyn MetricsSink>) -> Self {
        let svc = Self::new(metrics);
        let _ = svc.model.set(model);
        svc
    }

    pub fn state(&self) -> ServiceState {
        if self.model.get().is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Unloaded
        }
    }

    pub fn load_model(&self, path: &Path, meta: Option<&Path>) -> Result<(), PredictError> {
        if self.model.get().is_some() {
            return Err(PredictError::AlreadyLoaded);
        }
        let m = model::load_model(path, meta)?;
        tracing::info!("loaded model {} from {}", m.describe(), path.display());
        self.model.set(m).map_err(|_| PredictError::AlreadyLoaded)
    }

    pub fn predict_one(&self, fv: &FeatureVector) -> Result<Prediction, PredictError> {
        let mdl = self.model.get().ok_or(PredictError::NotReady)?;
        let x = fv.to_array();

        let started = Instant::now();
        let out = mdl.predict(&x);
        let latency = started.elapsed();

        let value = out
            .and_then(|y| {
                anyhow::ensure!(y.is_finite(), "non-finite prediction {}", y);
                Ok(y)
            })
            .map_err(|e| {
                tracing::error!("inference failed: {:#}", e);
                PredictError::Inference(format!("{:#}", e))
            })?;

        self.record(value, latency.as_secs_f64());

        Ok(Prediction {
            value,
            timestamp: Utc::now(),
            latency,
        })
    }

    pub fn predict_request(&self, req: &PredictionRequest) -> Result<Prediction, PredictError> {
        let fv = build_features(req)?;
        self.predict_one(&fv)
    }

    /// Each record is scored on its own; the output has one entry per input,
    /// in input order.
    pub fn predict_batch(
        &self,
        reqs: &[PredictionRequest],
    ) -> Vec<Result<Prediction, PredictError>> {
        reqs.iter().map(|r| self.predict_request(r)).collect()
    }

    // Metrics never fail a prediction.
    fn record(&self, value: f64, latency_s: f64) {
        let results = [
            self.metrics.increment_counter(PREDICTIONS_TOTAL),
            self.metrics.set_gauge(CO_LEVEL, value),
            self.metrics.observe_histogram(PREDICTION_LATENCY, latency_s),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            tracing::warn!("metrics sink: {}", e);
        }
    }
}
