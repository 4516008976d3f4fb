use anyhow::{bail, ensure, Context, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{fs, path::Path, sync::Arc};
use tch::{kind::Kind, CModule, Device, Tensor};

use crate::error::PredictError;
use crate::features::{COLUMNS, FEATURE_COUNT};

/// A pre-trained CO regressor. Implementations must tolerate concurrent
/// `predict` calls.
pub trait Regressor: Send + Sync {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> Result<f64>;

    fn describe(&self) -> String;
}

/// Per-column standardisation applied before inference, as fitted at training.
#[derive(Deserialize, Debug, Clone)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    fn check(&self) -> Result<()> {
        ensure!(
            self.mean.len() == FEATURE_COUNT && self.scale.len() == FEATURE_COUNT,
            "scaler needs {} means and scales, got {} and {}",
            FEATURE_COUNT,
            self.mean.len(),
            self.scale.len()
        );
        if let Some(i) = self.scale.iter().position(|s| *s == 0.0 || !s.is_finite()) {
            bail!("scaler scale for {} is {}", COLUMNS[i], self.scale[i]);
        }
        Ok(())
    }

    fn apply(&self, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = *x;
        for (i, v) in out.iter_mut().enumerate() {
            *v = (*v - self.mean[i]) / self.scale[i];
        }
        out
    }
}

#[derive(Deserialize)]
struct MetaJson {
    feat_list: Vec<String>,
    in_dim: Option<usize>,
    scaler: Option<Scaler>,
}

fn check_feat_list(feat_list: &[String]) -> Result<()> {
    ensure!(
        feat_list.len() == FEATURE_COUNT,
        "feat_list has {} columns, expected {}",
        feat_list.len(),
        FEATURE_COUNT
    );
    for (i, (got, want)) in feat_list.iter().zip(COLUMNS).enumerate() {
        ensure!(got == want, "feat_list[{}] is {:?}, expected {:?}", i, got, want);
    }
    Ok(())
}

fn read_meta(meta_path: &Path) -> Result<MetaJson> {
    let meta_txt = fs::read_to_string(meta_path)
        .with_context(|| format!("failed to read meta at {}", meta_path.display()))?;
    let meta: MetaJson =
        serde_json::from_str(&meta_txt).with_context(|| "failed to parse meta.json")?;

    check_feat_list(&meta.feat_list)?;
    let in_dim = meta.in_dim.unwrap_or(meta.feat_list.len());
    ensure!(in_dim == FEATURE_COUNT, "meta.in_dim is {}, expected {}", in_dim, FEATURE_COUNT);
    if let Some(s) = &meta.scaler {
        s.check()?;
    }
    Ok(meta)
}

// ---------- TorchScript ----------

pub struct TorchRegressor {
    // forward is serialised; the lock is held for the forward call only
    model: Mutex<CModule>,
    device: Device,
    scaler: Option<Scaler>,
}

impl TorchRegressor {
    pub fn load(model_path: &Path, meta_path: Option<&Path>) -> Result<Self> {
        let device = Device::Cpu;

        let scaler = match meta_path {
            Some(p) => read_meta(p)?.scaler,
            None => None,
        };

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path.display()))?;

        let me = Self {
            model: Mutex::new(model),
            device,
            scaler,
        };

        // Warm up on a zero row; a regressor must answer with a single value
        me.forward(&[0.0; FEATURE_COUNT])
            .context("warmup forward failed")?;
        Ok(me)
    }

    fn forward(&self, x: &[f64; FEATURE_COUNT]) -> Result<f64> {
        let row: Vec<f32> = x.iter().map(|v| *v as f32).collect();
        let input = Tensor::from_slice(&row)
            .reshape([1, FEATURE_COUNT as i64])
            .to_device(self.device);

        let out = {
            let model = self.model.lock();
            model.forward_ts(&[input])?
        };

        let sz = out.size();
        if out.numel() != 1 {
            bail!("unexpected model output size: {:?}", sz);
        }
        Ok(out.to_kind(Kind::Double).reshape([-1]).double_value(&[0]))
    }
}

impl Regressor for TorchRegressor {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> Result<f64> {
        match &self.scaler {
            Some(s) => self.forward(&s.apply(x)),
            None => self.forward(x),
        }
    }

    fn describe(&self) -> String {
        format!("torchscript(scaled={})", self.scaler.is_some())
    }
}

// ---------- Linear ----------

#[derive(Deserialize)]
struct LinearJson {
    feat_list: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
    scaler: Option<Scaler>,
}

/// Ordinary/ridge/lasso regression exported as coefficients + intercept.
#[derive(Debug, Clone)]
pub struct LinearRegressor {
    coefficients: [f64; FEATURE_COUNT],
    intercept: f64,
    scaler: Option<Scaler>,
}

impl LinearRegressor {
    pub fn new(coefficients: [f64; FEATURE_COUNT], intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
            scaler: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read linear model at {}", path.display()))?;
        let lin: LinearJson =
            serde_json::from_str(&txt).with_context(|| "failed to parse linear model json")?;

        check_feat_list(&lin.feat_list)?;
        let coefficients: [f64; FEATURE_COUNT] =
            lin.coefficients.as_slice().try_into().map_err(|_| {
                anyhow::anyhow!(
                    "expected {} coefficients, got {}",
                    FEATURE_COUNT,
                    lin.coefficients.len()
                )
            })?;
        if let Some(s) = &lin.scaler {
            s.check()?;
        }

        Ok(Self {
            coefficients,
            intercept: lin.intercept,
            scaler: lin.scaler,
        })
    }
}

impl Regressor for LinearRegressor {
    fn predict(&self, x: &[f64; FEATURE_COUNT]) -> Result<f64> {
        let x = match &self.scaler {
            Some(s) => s.apply(x),
            None => *x,
        };
        Ok(self.intercept
            + x.iter()
                .zip(self.coefficients.iter())
                .map(|(a, b)| a * b)
                .sum::<f64>())
    }

    fn describe(&self) -> String {
        format!("linear(intercept={:.4}, scaled={})", self.intercept, self.scaler.is_some())
    }
}

// ---------- Loading ----------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    TorchScript,
    LinearJson,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModelFormat::LinearJson,
            _ => ModelFormat::TorchScript,
        }
    }
}

/// Loads the persisted regressor at `path`. `meta` is only accepted for
/// TorchScript models; linear JSON carries its own column list and scaler,
/// so a meta file next to one is a configuration error.
pub fn load_model(path: &Path, meta: Option<&Path>) -> Result<Arc<dyn Regressor>, PredictError> {
    let to_err = |e: anyhow::Error| PredictError::ModelLoad {
        path: path.display().to_string(),
        message: format!("{:#}", e),
    };

    if !path.is_file() {
        return Err(to_err(anyhow::anyhow!("no such file")));
    }

    let model: Arc<dyn Regressor> = match ModelFormat::from_path(path) {
        ModelFormat::LinearJson => {
            if let Some(m) = meta {
                return Err(to_err(anyhow::anyhow!(
                    "meta file {} is only used by TorchScript models; \
                     linear JSON carries its own feat_list and scaler",
                    m.display()
                )));
            }
            Arc::new(LinearRegressor::load(path).map_err(to_err)?)
        }
        ModelFormat::TorchScript => Arc::new(TorchRegressor::load(path, meta).map_err(to_err)?),
    };
    Ok(model)
}
