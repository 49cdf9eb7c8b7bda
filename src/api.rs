use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::engine::{ScoreEngine, ScoringRequest, ScoringResult, DEFAULT_ALPHA};
use crate::error::CredibilityError;
use crate::features::parse_request_url;
use crate::feedback::{append_record, check_snapshot, label_from_value, FeedbackRecord};
use crate::fetch::{HtmlFetcher, NoopFetcher};
use crate::model::TrainingMetadata;
use crate::store::ModelHandle;
use crate::telemetry::anon_hash;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScoreEngine>,
    pub model: ModelHandle,
    pub fetcher: Arc<dyn HtmlFetcher>,
    /// Feedback log path; the lock serializes appends.
    pub feedback_log: Arc<Mutex<PathBuf>>,
    pub default_alpha: f64,
}

impl AppState {
    pub fn new(engine: ScoreEngine, model: ModelHandle, feedback_log: impl Into<PathBuf>) -> Self {
        Self {
            engine: Arc::new(engine),
            model,
            fetcher: Arc::new(NoopFetcher),
            feedback_log: Arc::new(Mutex::new(feedback_log.into())),
            default_alpha: DEFAULT_ALPHA,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn HtmlFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_default_alpha(mut self, alpha: f64) -> Self {
        self.default_alpha = alpha;
        self
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/score", get(score_get).post(score_post))
        .route("/feedback", post(feedback))
        .route("/admin/reload-model", post(admin_reload_model))
        .route("/model", get(model_info))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Library errors mapped onto HTTP statuses with a JSON body.
pub struct ApiError(CredibilityError);

impl From<CredibilityError> for ApiError {
    fn from(e: CredibilityError) -> Self {
        Self(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self(CredibilityError::invalid_input(e.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self(CredibilityError::invalid_input(e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CredibilityError::InvalidInput(_) | CredibilityError::DataFormat { .. } => {
                StatusCode::BAD_REQUEST
            }
            CredibilityError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CredibilityError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            CredibilityError::Io(_) | CredibilityError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({ "error": self.0.to_string(), "kind": self.0.kind() }));
        (status, body).into_response()
    }
}

/// Query string or JSON body for `/score`; `alpha` falls back to the
/// configured default.
#[derive(Debug, Deserialize)]
struct ScoreParams {
    #[serde(default)]
    url: String,
    #[serde(default)]
    alpha: Option<f64>,
    #[serde(default)]
    fetch_html: bool,
}

async fn score_get(
    State(state): State<AppState>,
    q: Result<Query<ScoreParams>, QueryRejection>,
) -> Result<Json<ScoringResult>, ApiError> {
    let Query(q) = q?;
    run_score(&state, q).await
}

async fn score_post(
    State(state): State<AppState>,
    body: Result<Json<ScoreParams>, JsonRejection>,
) -> Result<Json<ScoringResult>, ApiError> {
    let Json(body) = body?;
    run_score(&state, body).await
}

async fn run_score(state: &AppState, p: ScoreParams) -> Result<Json<ScoringResult>, ApiError> {
    let req = ScoringRequest::new(p.url)
        .alpha(p.alpha.unwrap_or(state.default_alpha))
        .fetch_html(p.fetch_html);

    // Only hit the network for requests that can actually be scored
    let fetchable =
        req.fetch_html && (0.0..=1.0).contains(&req.alpha) && parse_request_url(&req.url).is_ok();
    let html = if fetchable {
        state.fetcher.fetch(&req.url).await
    } else {
        None
    };

    let model = state.model.snapshot();
    let result = state
        .engine
        .score(&req, model.as_deref(), html.as_deref())?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct FeedbackIn {
    #[serde(default)]
    url: String,
    #[serde(default)]
    label: serde_json::Value,
    #[serde(default)]
    features: Option<BTreeMap<String, f64>>,
}

async fn feedback(
    State(state): State<AppState>,
    body: Result<Json<FeedbackIn>, JsonRejection>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let Json(body) = body?;
    let url = body.url.trim();
    if url.is_empty() {
        return Err(CredibilityError::invalid_input("url must not be empty").into());
    }
    let label = label_from_value(&body.label).map_err(CredibilityError::invalid_input)?;
    if let Some(snapshot) = &body.features {
        check_snapshot(snapshot).map_err(CredibilityError::invalid_input)?;
    }

    let record = FeedbackRecord {
        url: url.to_string(),
        label,
        timestamp: Some(Utc::now()),
        features: body.features,
    };
    {
        let path = state
            .feedback_log
            .lock()
            .map_err(|_| CredibilityError::Io(std::io::Error::other("feedback log lock poisoned")))?;
        append_record(&path, &record)?;
    }

    metrics::counter!("credibility_feedback_appended_total").increment(1);
    info!(target: "api", url_id = %anon_hash(url), %label, "feedback recorded");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "appended": true, "label": label })),
    ))
}

#[derive(Debug, Serialize)]
struct ReloadOut {
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    training_size: Option<usize>,
}

async fn admin_reload_model(State(state): State<AppState>) -> Json<ReloadOut> {
    let loaded = state.model.reload();
    if loaded.is_none() {
        warn!(target: "api", path = %state.model.path().display(), "reload requested but no usable artifact");
    }
    Json(ReloadOut {
        loaded: loaded.is_some(),
        training_size: loaded.map(|m| m.metadata.training_size),
    })
}

#[derive(Debug, Serialize)]
struct ModelOut {
    loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<TrainingMetadata>,
}

async fn model_info(State(state): State<AppState>) -> Json<ModelOut> {
    let out = match state.model.snapshot() {
        Some(m) => ModelOut {
            loaded: true,
            version: Some(m.version),
            schema: Some(m.schema.clone()),
            temperature: Some(m.temperature),
            metadata: Some(m.metadata.clone()),
        },
        None => ModelOut {
            loaded: false,
            version: None,
            schema: None,
            temperature: None,
            metadata: None,
        },
    };
    Json(out)
}
