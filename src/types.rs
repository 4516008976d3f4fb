use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One sensor/weather reading as posted by clients.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PredictionRequest {
    pub date: String, // "2024-02-21" or "21/02/2024"
    pub time: String, // "14:30:00" or "14.30.00"
    pub temperature: f64,
    pub humidity: f64, // %RH, 0..=100
    pub nox: f64,
    pub no2: f64,
    pub o3: f64,
}

/// A CO estimate (ppm) and when it was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time spent in the model's forward call only.
    pub latency: Duration,
}

/// Row shape of the prediction log read by the dashboards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub prediction: f64,
    pub latency: f64, // seconds
    pub temperature: f64,
    pub humidity: f64,
    pub nox: f64,
}

impl PredictionRecord {
    pub fn new(req: &PredictionRequest, pred: &Prediction) -> Self {
        Self {
            timestamp: pred.timestamp,
            prediction: pred.value,
            latency: pred.latency.as_secs_f64(),
            temperature: req.temperature,
            humidity: req.humidity,
            nox: req.nox,
        }
    }
}
