//! Prediction metrics.
//!
//! The service only sees [`MetricsSink`]. [`Registry`] is the in-process
//! sink behind `GET /metrics`; it renders the Prometheus text format.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::MetricsError;

pub const PREDICTIONS_TOTAL: &str = "air_quality_predictions_total";
pub const CO_LEVEL: &str = "air_quality_co_level";
pub const PREDICTION_LATENCY: &str = "prediction_latency_seconds";

/// Where the service reports what it did. Callers ignore failures.
pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &str) -> Result<(), MetricsError>;
    fn set_gauge(&self, name: &str, value: f64) -> Result<(), MetricsError>;
    fn observe_histogram(&self, name: &str, value: f64) -> Result<(), MetricsError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn increment_counter(&self, _name: &str) -> Result<(), MetricsError> {
        Ok(())
    }
    fn set_gauge(&self, _name: &str, _value: f64) -> Result<(), MetricsError> {
        Ok(())
    }
    fn observe_histogram(&self, _name: &str, _value: f64) -> Result<(), MetricsError> {
        Ok(())
    }
}

// Same default buckets as the Prometheus client libraries, in seconds.
const DEFAULT_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Vec<f64>,
    counts: Vec<u64>, // per bucket, last slot is +Inf
    sum: f64,
    count: u64,
}

impl Histogram {
    pub fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len() + 1],
            sum: 0.0,
            count: 0,
        }
    }

    pub fn observe(&mut self, v: f64) {
        let idx = self
            .bounds
            .iter()
            .position(|b| v <= *b)
            .unwrap_or(self.bounds.len());
        self.counts[idx] += 1;
        self.sum += v;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    fn render(&self, name: &str, out: &mut String) {
        let mut cumulative = 0u64;
        for (i, le) in self.bounds.iter().enumerate() {
            cumulative += self.counts[i];
            let _ = writeln!(out, "{name}_bucket{{le=\"{le}\"}} {cumulative}");
        }
        cumulative += self.counts.last().copied().unwrap_or(0);
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");
        let _ = writeln!(out, "{name}_sum {}", self.sum);
        let _ = writeln!(out, "{name}_count {}", self.count);
    }
}

#[derive(Debug, Clone)]
enum Metric {
    Counter(u64),
    Gauge(f64),
    Histogram(Histogram),
}

impl Metric {
    fn type_name(&self) -> &'static str {
        match self {
            Metric::Counter(_) => "counter",
            Metric::Gauge(_) => "gauge",
            Metric::Histogram(_) => "histogram",
        }
    }
}

struct Entry {
    help: String,
    metric: Metric,
}

#[derive(Default)]
pub struct Registry {
    entries: Mutex<BTreeMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three prediction metrics pre-registered.
    pub fn with_prediction_metrics() -> Self {
        let r = Self::new();
        r.register_counter(PREDICTIONS_TOTAL, "Total number of predictions made");
        r.register_gauge(CO_LEVEL, "Predicted CO level");
        r.register_histogram(PREDICTION_LATENCY, "Time taken for prediction", &DEFAULT_BUCKETS);
        r
    }

    pub fn register_counter(&self, name: &str, help: &str) {
        self.register(name, help, Metric::Counter(0));
    }

    pub fn register_gauge(&self, name: &str, help: &str) {
        self.register(name, help, Metric::Gauge(0.0));
    }

    pub fn register_histogram(&self, name: &str, help: &str, bounds: &[f64]) {
        self.register(name, help, Metric::Histogram(Histogram::new(bounds)));
    }

    fn register(&self, name: &str, help: &str, metric: Metric) {
        self.entries.lock().insert(
            name.to_string(),
            Entry {
                help: help.to_string(),
                metric,
            },
        );
    }

    fn with_metric<R>(
        &self,
        name: &str,
        requested: &'static str,
        f: impl FnOnce(&mut Metric) -> Option<R>,
    ) -> Result<R, MetricsError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| MetricsError::Unknown(name.to_string()))?;
        let actual = entry.metric.type_name();
        f(&mut entry.metric).ok_or_else(|| MetricsError::WrongType {
            name: name.to_string(),
            actual,
            requested,
        })
    }

    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.entries.lock().get(name).map(|e| &e.metric) {
            Some(Metric::Counter(c)) => Some(*c),
            _ => None,
        }
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        match self.entries.lock().get(name).map(|e| &e.metric) {
            Some(Metric::Gauge(g)) => Some(*g),
            _ => None,
        }
    }

    pub fn histogram(&self, name: &str) -> Option<Histogram> {
        match self.entries.lock().get(name).map(|e| &e.metric) {
            Some(Metric::Histogram(h)) => Some(h.clone()),
            _ => None,
        }
    }

    /// Prometheus text exposition format, version 0.0.4.
    pub fn render(&self) -> String {
        let entries = self.entries.lock();
        let mut out = String::new();
        for (name, entry) in entries.iter() {
            let _ = writeln!(out, "# HELP {name} {}", entry.help);
            let _ = writeln!(out, "# TYPE {name} {}", entry.metric.type_name());
            match &entry.metric {
                Metric::Counter(c) => {
                    let _ = writeln!(out, "{name} {c}");
                }
                Metric::Gauge(g) => {
                    let _ = writeln!(out, "{name} {g}");
                }
                Metric::Histogram(h) => h.render(name, &mut out),
            }
        }
        out
    }
}

impl MetricsSink for Registry {
    fn increment_counter(&self, name: &str) -> Result<(), MetricsError> {
        self.with_metric(name, "counter", |m| match m {
            Metric::Counter(c) => {
                *c += 1;
                Some(())
            }
            _ => None,
        })
    }

    fn set_gauge(&self, name: &str, value: f64) -> Result<(), MetricsError> {
        self.with_metric(name, "gauge", |m| match m {
            Metric::Gauge(g) => {
                *g = value;
                Some(())
            }
            _ => None,
        })
    }

    fn observe_histogram(&self, name: &str, value: f64) -> Result<(), MetricsError> {
        self.with_metric(name, "histogram", |m| match m {
            Metric::Histogram(h) => {
                h.observe(value);
                Some(())
            }
            _ => None,
        })
    }
}
