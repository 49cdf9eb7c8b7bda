//! # Score Engine
//! Pure mapping `(ScoringRequest, Option<&ModelArtifact>, Option<html>)` →
//! `ScoringResult`. No I/O and no hidden state: the host decides which model
//! (if any) to pass in and fetches page content itself.
//!
//! Policy: rule score from the fixed weight table, model score from the
//! artifact (or `FALLBACK_MODEL_SCORE`), blended by `alpha`, then bucketed
//! into 1–5 stars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domains::{DomainConfidence, DomainProfile, ReputableDomains};
use crate::error::{CredibilityError, Result};
use crate::features::{
    extract_content_signals, extract_url_signals, parse_request_url, FeatureVector,
};
use crate::model::{ModelArtifact, ModelContribution, FALLBACK_MODEL_SCORE};
use crate::rules::{rule_score, RuleHit, RuleWeights};
use crate::telemetry::anon_hash;

pub const DEFAULT_ALPHA: f64 = 0.5;
pub const DEFAULT_TOP_N: usize = 5;

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub url: String,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub fetch_html: bool,
}

impl ScoringRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            alpha: DEFAULT_ALPHA,
            fetch_html: false,
        }
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn fetch_html(mut self, on: bool) -> Self {
        self.fetch_html = on;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredibilityLevel {
    Low,
    Moderate,
    High,
}

impl CredibilityLevel {
    pub fn from_score(s: f64) -> Self {
        if s < 0.35 {
            CredibilityLevel::Low
        } else if s < 0.65 {
            CredibilityLevel::Moderate
        } else {
            CredibilityLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContributionSource {
    Rule,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub weight: f64,
    pub source: ContributionSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    pub rule_score: f64,
    pub model_score: f64,
    pub hybrid_score: f64,
    pub alpha: f64,
    pub star_rating: u8,
    pub level: CredibilityLevel,
    pub model_used: bool,
    pub content_used: bool,
    pub domain: DomainProfile,
    pub explanation: String,
    pub contributions: Vec<Contribution>,
}

/// Five equal-width bands over [0,1]; a boundary belongs to the lower band.
pub fn star_rating(hybrid: f64) -> u8 {
    let s = if hybrid.is_nan() { 0.0 } else { hybrid };
    if s <= 0.2 {
        1
    } else if s <= 0.4 {
        2
    } else if s <= 0.6 {
        3
    } else if s <= 0.8 {
        4
    } else {
        5
    }
}

/// `alpha·model + (1−alpha)·rule`, clamped to [0,1].
pub fn blend(alpha: f64, model_score: f64, rule_score: f64) -> f64 {
    (alpha * model_score + (1.0 - alpha) * rule_score).clamp(0.0, 1.0)
}

/// Everything the engine derives from a request before blending.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub features: FeatureVector,
    pub rule_hits: Vec<RuleHit>,
    pub domain: DomainProfile,
    pub content_used: bool,
}

#[derive(Debug, Clone)]
pub struct ScoreEngine {
    weights: RuleWeights,
    domains: ReputableDomains,
    top_n: usize,
}

impl Default for ScoreEngine {
    fn default() -> Self {
        Self::new(RuleWeights::default(), ReputableDomains::default_seed())
    }
}

impl ScoreEngine {
    pub fn new(weights: RuleWeights, domains: ReputableDomains) -> Self {
        Self {
            weights,
            domains,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, n: usize) -> Self {
        self.top_n = n;
        self
    }

    pub fn weights(&self) -> &RuleWeights {
        &self.weights
    }

    /// Features for a URL plus optional HTML, as of `now`.
    pub fn extract(
        &self,
        raw_url: &str,
        html: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Extraction> {
        let url = parse_request_url(raw_url)?;
        let url_sig = extract_url_signals(&url, &self.domains);
        let content = html
            .map(|h| extract_content_signals(h, now))
            .unwrap_or_default();
        let outcome = rule_score(&url_sig, &content, &self.weights);
        Ok(Extraction {
            features: FeatureVector::assemble(&url_sig, &content, outcome.score),
            rule_hits: outcome.hits,
            domain: self.domains.profile(&url_sig.host),
            content_used: content.has_content,
        })
    }

    /// Score with the current wall clock.
    pub fn score(
        &self,
        request: &ScoringRequest,
        model: Option<&ModelArtifact>,
        html: Option<&str>,
    ) -> Result<ScoringResult> {
        self.score_at(request, model, html, Utc::now())
    }

    /// Score as of `now` (only content recency depends on it).
    ///
    /// `html` is ignored unless `request.fetch_html` is set.
    pub fn score_at(
        &self,
        request: &ScoringRequest,
        model: Option<&ModelArtifact>,
        html: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ScoringResult> {
        let alpha = request.alpha;
        if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
            metrics::counter!("credibility_score_invalid_total").increment(1);
            return Err(CredibilityError::invalid_input(format!(
                "alpha must be within [0, 1], got {alpha}"
            )));
        }
        let html = if request.fetch_html { html } else { None };
        let ex = self.extract(&request.url, html, now).inspect_err(|_| {
            metrics::counter!("credibility_score_invalid_total").increment(1);
        })?;
        let rule = ex.features.rule_score;

        let predicted = model.map(|m| m.predict(&ex.features));
        let (model_score, model_contribs, model_note) = match predicted {
            Some(Ok(out)) => (out.probability, out.contributions, None),
            Some(Err(e)) => {
                warn!(target: "engine", url_id = %anon_hash(&request.url), error = %e, "model unusable; using fallback score");
                (FALLBACK_MODEL_SCORE, Vec::new(), Some("model unusable"))
            }
            None => (FALLBACK_MODEL_SCORE, Vec::new(), Some("no model loaded")),
        };
        let model_used = model_note.is_none();
        if !model_used {
            metrics::counter!("credibility_model_fallback_total").increment(1);
        }

        let hybrid = blend(alpha, model_score, rule);
        let stars = star_rating(hybrid);

        let top_model: Vec<&ModelContribution> =
            model_contribs.iter().take(self.top_n).collect();
        let explanation = explain(
            alpha,
            rule,
            model_score,
            model_note,
            &ex,
            &top_model,
            request.fetch_html,
        );

        let mut contributions: Vec<Contribution> = ex
            .rule_hits
            .iter()
            .map(|h| Contribution {
                feature: h.feature.to_string(),
                weight: h.weight,
                source: ContributionSource::Rule,
            })
            .collect();
        contributions.extend(top_model.iter().map(|c| Contribution {
            feature: c.feature.clone(),
            weight: c.contribution,
            source: ContributionSource::Model,
        }));

        metrics::counter!("credibility_score_requests_total").increment(1);
        metrics::histogram!("credibility_hybrid_score").record(hybrid);
        debug!(
            target: "engine",
            url_id = %anon_hash(&request.url),
            rule, model = model_score, hybrid, stars, model_used,
            "scored"
        );

        Ok(ScoringResult {
            rule_score: rule,
            model_score,
            hybrid_score: hybrid,
            alpha,
            star_rating: stars,
            level: CredibilityLevel::from_score(hybrid),
            model_used,
            content_used: ex.content_used,
            domain: ex.domain,
            explanation,
            contributions,
        })
    }
}

fn explain(
    alpha: f64,
    rule: f64,
    model: f64,
    model_note: Option<&str>,
    ex: &Extraction,
    top_model: &[&ModelContribution],
    content_requested: bool,
) -> String {
    let mut parts = Vec::new();
    parts.push(format!(
        "Blended {:.2}*model + {:.2}*rules. Rule={:.2}, Model={:.2}{}.",
        alpha,
        1.0 - alpha,
        rule,
        model,
        model_note
            .map(|n| format!(" (fallback: {n})"))
            .unwrap_or_default()
    ));

    if ex.rule_hits.is_empty() {
        parts.push("Rule signals: baseline only.".to_string());
    } else {
        let hits: Vec<String> = ex
            .rule_hits
            .iter()
            .map(|h| format!("{}({:+.2})", h.feature, h.weight))
            .collect();
        parts.push(format!("Rule signals: {}.", hits.join(", ")));
    }

    if !top_model.is_empty() {
        let top: Vec<String> = top_model
            .iter()
            .map(|c| format!("{}({:+.2})", c.feature, c.contribution))
            .collect();
        parts.push(format!("Top model features: {}.", top.join(", ")));
    }

    let confidence = match ex.domain.confidence {
        DomainConfidence::High => "high",
        DomainConfidence::Medium => "medium",
        DomainConfidence::Low => "low",
    };
    parts.push(format!(
        "Domain: {} ({}, {} confidence).",
        ex.domain.host, ex.domain.category, confidence
    ));

    parts.push(
        match (content_requested, ex.content_used) {
            (false, _) => "Content: not requested.",
            (true, true) => "Content: analyzed.",
            (true, false) => "Content: unavailable.",
        }
        .to_string(),
    );

    parts.join(" ")
}
