//! CO-level prediction for the air-quality monitor: feature building,
//! model loading and the serving surface around them.

pub mod alerts;
pub mod api;
pub mod config;
pub mod error;
pub mod features;
pub mod metrics;
pub mod model;
pub mod service;
pub mod types;

pub use error::PredictError;
pub use features::{build_features, FeatureVector};
pub use service::{PredictionService, ServiceState};
pub use types::{Prediction, PredictionRequest};
