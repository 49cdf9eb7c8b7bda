use axum::{routing::get, Router};
use metrics::{describe_counter, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register metric descriptions.
    pub fn init(default_alpha: f64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        describe();
        // Static gauge so dashboards can show the configured blend
        gauge!("credibility_default_alpha").set(default_alpha);
        Ok(Self { handle })
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

fn describe() {
    describe_counter!(
        "credibility_score_requests_total",
        "Successfully scored requests"
    );
    describe_counter!(
        "credibility_score_invalid_total",
        "Scoring requests rejected as invalid input"
    );
    describe_counter!(
        "credibility_model_fallback_total",
        "Scores produced without a usable model"
    );
    describe_histogram!("credibility_hybrid_score", "Distribution of hybrid scores");
    describe_counter!(
        "credibility_feedback_appended_total",
        "Feedback records appended to the log"
    );
    describe_counter!(
        "credibility_model_reloads_total",
        "Model artifact reload attempts"
    );
    describe_counter!(
        "credibility_fetch_errors_total",
        "Page fetches that produced no content"
    );
}
