use thiserror::Error;

/// Everything that can go wrong between a raw reading and a CO estimate.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("cannot parse {field} {value:?}: expected one of {expected}")]
    InputParse {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{field} = {value} is outside [{min}, {max}]")]
    Validation {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("failed to load model from {path}: {message}")]
    ModelLoad { path: String, message: String },

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("no model loaded")]
    NotReady,

    #[error("model already loaded")]
    AlreadyLoaded,
}

impl PredictError {
    /// Stable machine-readable name, used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::InputParse { .. } => "input_parse_error",
            PredictError::Validation { .. } => "validation_error",
            PredictError::ModelLoad { .. } => "model_load_error",
            PredictError::Inference(_) => "inference_error",
            PredictError::NotReady => "not_ready",
            PredictError::AlreadyLoaded => "already_loaded",
        }
    }
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metric {0} is not registered")]
    Unknown(String),

    #[error("metric {name} is a {actual}, not a {requested}")]
    WrongType {
        name: String,
        actual: &'static str,
        requested: &'static str,
    },

    #[error("metrics sink unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let errs = [
            PredictError::InputParse { field: "date", value: "x".into(), expected: "%Y-%m-%d" },
            PredictError::Validation { field: "humidity", value: 101.0, min: 0.0, max: 100.0 },
            PredictError::ModelLoad { path: "m.pt".into(), message: "missing".into() },
            PredictError::Inference("shape".into()),
            PredictError::NotReady,
            PredictError::AlreadyLoaded,
        ];
        let mut kinds: Vec<_> = errs.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errs.len());
    }

    #[test]
    fn validation_message_names_field() {
        let e = PredictError::Validation { field: "humidity", value: 120.0, min: 0.0, max: 100.0 };
        assert_eq!(e.to_string(), "humidity = 120 is outside [0, 100]");
    }
}
