use std::sync::Arc;

use aq_predictor::api::{self, AppState};
use aq_predictor::config::Config;
use aq_predictor::metrics::Registry;
use aq_predictor::service::PredictionService;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;

    let metrics = Arc::new(Registry::with_prediction_metrics());
    let svc = PredictionService::new(metrics.clone());

    // No model, no service
    svc.load_model(&cfg.model_path, cfg.meta_path.as_deref())?;

    let state = AppState {
        svc: Arc::new(svc),
        metrics,
        alerts: Arc::new(cfg.alerts.clone()),
        log_pred: cfg.log_pred,
    };

    let app = api::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
