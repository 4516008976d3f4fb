//! End-to-end tests for the prediction service: file-backed models, the
//! reference reading and concurrent callers.

use std::{
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use aq_predictor::features::{COLUMNS, FEATURE_COUNT};
use aq_predictor::metrics::{NoopSink, Registry, PREDICTIONS_TOTAL, PREDICTION_LATENCY};
use aq_predictor::model::Regressor;
use aq_predictor::{
    build_features, PredictError, PredictionRequest, PredictionService, ServiceState,
};

fn reference_reading() -> PredictionRequest {
    PredictionRequest {
        date: "2024-02-21".into(),
        time: "14:30:00".into(),
        temperature: 25.0,
        humidity: 60.0,
        nox: 120.0,
        no2: 80.0,
        o3: 100.0,
    }
}

/// Returns the sum of its inputs, sleeping first so calls overlap.
struct SlowSum(Duration);

impl Regressor for SlowSum {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> anyhow::Result<f64> {
        thread::sleep(self.0);
        Ok(x.iter().sum())
    }

    fn describe(&self) -> String {
        "slow-sum".into()
    }
}

#[test]
fn reference_reading_end_to_end() {
    let fv = build_features(&reference_reading()).unwrap();
    assert_eq!(
        fv.to_array(),
        [
            1000.0, 100.0, 10.0, 900.0, 120.0, 1000.0, 80.0, 1000.0, 100.0, 25.0, 60.0, 6.0,
            14.0, 2.0, 2.0,
        ]
    );

    // Unit coefficients turn the prediction into the sum of the vector
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linear_regression.json");
    let coefs = [1.0; FEATURE_COUNT];
    let model = serde_json::json!({
        "feat_list": COLUMNS,
        "coefficients": coefs,
        "intercept": 0.0,
    });
    std::fs::write(&path, model.to_string()).unwrap();

    let svc = PredictionService::new(Arc::new(NoopSink));
    svc.load_model(&path, None).unwrap();
    assert_eq!(svc.state(), ServiceState::Ready);

    let p = svc.predict_request(&reference_reading()).unwrap();
    let expected: f64 = fv.to_array().iter().sum();
    assert!((p.value - expected).abs() < 1e-9);
}

#[test]
fn nonexistent_model_leaves_service_unloaded() {
    let svc = PredictionService::new(Arc::new(NoopSink));
    let err = svc
        .load_model(Path::new("models/random_forest.pt"), None)
        .unwrap_err();
    assert_eq!(err.kind(), "model_load_error");
    assert_eq!(svc.state(), ServiceState::Unloaded);

    let fv = build_features(&reference_reading()).unwrap();
    assert!(matches!(svc.predict_one(&fv), Err(PredictError::NotReady)));
}

#[test]
fn concurrent_predictions_are_independent() {
    let delay = Duration::from_millis(20);
    let reg = Arc::new(Registry::with_prediction_metrics());
    let svc = Arc::new(PredictionService::with_model(
        Arc::new(SlowSum(delay)),
        reg.clone(),
    ));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let svc = svc.clone();
            thread::spawn(move || {
                let mut req = reference_reading();
                req.temperature = i as f64;
                let fv = build_features(&req).unwrap();
                let expected: f64 = fv.to_array().iter().sum();
                let p = svc.predict_one(&fv).unwrap();
                (expected, p)
            })
        })
        .collect();

    for h in handles {
        let (expected, p) = h.join().unwrap();
        assert!((p.value - expected).abs() < 1e-9);
        // each call times only its own forward pass
        assert!(p.latency >= delay);
        assert!(p.latency < delay * 8, "latency {:?}", p.latency);
    }

    assert_eq!(reg.counter(PREDICTIONS_TOTAL), Some(8));
    assert_eq!(reg.histogram(PREDICTION_LATENCY).unwrap().count(), 8);
}

#[test]
fn batch_has_one_result_per_record_in_order() {
    let svc =
        PredictionService::with_model(Arc::new(SlowSum(Duration::ZERO)), Arc::new(NoopSink));
    let mut reqs: Vec<PredictionRequest> = (0..5)
        .map(|i| {
            let mut r = reference_reading();
            r.nox = i as f64;
            r
        })
        .collect();
    reqs[3].time = "14:30".into();

    let out = svc.predict_batch(&reqs);
    assert_eq!(out.len(), reqs.len());
    for (i, res) in out.iter().enumerate() {
        if i == 3 {
            assert_eq!(res.as_ref().unwrap_err().kind(), "input_parse_error");
            continue;
        }
        let expected: f64 = build_features(&reqs[i]).unwrap().to_array().iter().sum();
        assert!((res.as_ref().unwrap().value - expected).abs() < 1e-9);
    }
}
