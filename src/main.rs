//! Credibility service: boots the Axum HTTP server with the scoring engine,
//! the current model artifact, and the feedback log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};

use credibility_insight::config::AppConfig;
use credibility_insight::fetch::{FetchConfig, HtmlFetcher, NoopFetcher, ReqwestFetcher};
use credibility_insight::metrics::Metrics;
use credibility_insight::store::{start_reload_thread, ModelHandle};
use credibility_insight::telemetry::init_tracing;
use credibility_insight::{router, AppState};

fn build_fetcher(cfg: &FetchConfig) -> Arc<dyn HtmlFetcher> {
    match ReqwestFetcher::new(cfg) {
        Ok(f) => Arc::new(f),
        Err(e) => {
            warn!(error = %e, "http client unavailable; content fetching disabled");
            Arc::new(NoopFetcher)
        }
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let cfg = AppConfig::load().context("loading credibility config")?;

    let model = ModelHandle::open(&cfg.paths.artifact);
    if cfg.server.model_reload_secs > 0 {
        start_reload_thread(
            model.clone(),
            Duration::from_secs(cfg.server.model_reload_secs),
        );
    }

    let state = AppState::new(cfg.build_engine(), model.clone(), &cfg.paths.feedback_log)
        .with_fetcher(build_fetcher(&cfg.fetch))
        .with_default_alpha(cfg.scoring.default_alpha);

    let mut app = router(state);
    if cfg.server.metrics {
        match Metrics::init(cfg.scoring.default_alpha) {
            Ok(m) => app = app.merge(m.router()),
            Err(e) => warn!(error = %e, "metrics recorder not installed"),
        }
    }

    info!(
        artifact = %cfg.paths.artifact.display(),
        feedback_log = %cfg.paths.feedback_log.display(),
        model_loaded = model.snapshot().is_some(),
        "credibility service ready"
    );
    Ok(app.into())
}
