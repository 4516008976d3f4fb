use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fmt, fs, path::Path};

use crate::types::PredictionRecord;

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AlertThresholds {
    pub co_level: f64,
    pub temperature: f64,
    pub humidity: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            co_level: 4.0,
            temperature: 30.0,
            humidity: 75.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alert {
    HighCoLevel(f64),
    HighTemperature(f64),
    HighHumidity(f64),
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::HighCoLevel(v) => write!(f, "High CO Level: {:.2}", v),
            Alert::HighTemperature(v) => write!(f, "High Temperature: {:.1}°C", v),
            Alert::HighHumidity(v) => write!(f, "High Humidity: {:.1}%", v),
        }
    }
}

impl AlertThresholds {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read alert thresholds at {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| "invalid alert thresholds JSON")
    }

    /// Alerts for every reading strictly above its threshold.
    pub fn check(&self, rec: &PredictionRecord) -> Vec<Alert> {
        let mut alerts = Vec::new();
        if rec.prediction > self.co_level {
            alerts.push(Alert::HighCoLevel(rec.prediction));
        }
        if rec.temperature > self.temperature {
            alerts.push(Alert::HighTemperature(rec.temperature));
        }
        if rec.humidity > self.humidity {
            alerts.push(Alert::HighHumidity(rec.humidity));
        }
        alerts
    }
}
