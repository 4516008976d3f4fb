use anyhow::{Context, Result};
use std::{env, path::{Path, PathBuf}};

use crate::alerts::AlertThresholds;

#[derive(Debug, Clone)]
pub struct Config {
    pub model_path: PathBuf,
    pub meta_path: Option<PathBuf>,
    pub port: u16,
    pub alerts: AlertThresholds,
    /// Log every feature vector (LOG_PRED=1).
    pub log_pred: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let model_path: PathBuf = var("MODEL_PATH").context("MODEL_PATH not set")?.into();
        let meta_path = var("META_PATH").filter(|s| !s.is_empty()).map(PathBuf::from);
        let port: u16 = match var("PORT") {
            Some(s) => s.parse().with_context(|| format!("invalid PORT {:?}", s))?,
            None => 8000,
        };
        let alerts = match var("ALERTS_PATH").filter(|s| !s.is_empty()) {
            Some(p) => AlertThresholds::load(Path::new(&p))?,
            None => AlertThresholds::default(),
        };
        let log_pred = var("LOG_PRED").as_deref() == Some("1");

        Ok(Self {
            model_path,
            meta_path,
            port,
            alerts,
            log_pred,
        })
    }
}
