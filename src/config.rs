//! Service configuration: TOML file, then environment overrides.
//!
//! ```toml
//! [scoring]
//! default_alpha = 0.5
//! rule_weights_path = "config/rule_weights.json"
//!
//! [paths]
//! artifact = "artifacts/model.json"
//! feedback_log = "data/feedback.jsonl"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use crate::domains::ReputableDomains;
use crate::engine::{ScoreEngine, DEFAULT_ALPHA, DEFAULT_TOP_N};
use crate::feedback::DEFAULT_FEEDBACK_PATH;
use crate::fetch::FetchConfig;
use crate::rules::{load_weights_file, RuleWeights};
use crate::store::DEFAULT_ARTIFACT_PATH;
use crate::training::TrainingConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/credibility.toml";

pub const ENV_CONFIG_PATH: &str = "CREDIBILITY_CONFIG_PATH";
pub const ENV_ARTIFACT_PATH: &str = "CREDIBILITY_ARTIFACT_PATH";
pub const ENV_FEEDBACK_PATH: &str = "CREDIBILITY_FEEDBACK_PATH";
pub const ENV_DEFAULT_ALPHA: &str = "CREDIBILITY_DEFAULT_ALPHA";
pub const ENV_MODEL_RELOAD: &str = "CREDIBILITY_MODEL_RELOAD";
pub const ENV_METRICS: &str = "CREDIBILITY_METRICS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub default_alpha: f64,
    /// JSON override for the rule table; missing keys keep their defaults.
    pub rule_weights_path: Option<PathBuf>,
    /// JSON map `domain -> label`; replaces the built-in list.
    pub reputable_domains_path: Option<PathBuf>,
    pub top_n_model_features: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            default_alpha: DEFAULT_ALPHA,
            rule_weights_path: None,
            reputable_domains_path: None,
            top_n_model_features: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub artifact: PathBuf,
    pub feedback_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifact: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            feedback_log: PathBuf::from(DEFAULT_FEEDBACK_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Artifact mtime poll interval; 0 disables the reload thread.
    pub model_reload_secs: u64,
    pub metrics: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model_reload_secs: 0,
            metrics: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scoring: ScoringConfig,
    pub paths: PathsConfig,
    pub fetch: FetchConfig,
    pub training: TrainingConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Resolve the config path from `CREDIBILITY_CONFIG_PATH` (or the default),
    /// read it if present, then apply environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut cfg = Self::load_file(&path)?;
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// A missing file yields defaults; an unreadable or invalid one is an error.
    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.scoring.default_alpha = sanitize_alpha(cfg.scoring.default_alpha);
        Ok(cfg)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(p) = lookup(ENV_ARTIFACT_PATH).filter(|s| !s.trim().is_empty()) {
            self.paths.artifact = PathBuf::from(p.trim());
        }
        if let Some(p) = lookup(ENV_FEEDBACK_PATH).filter(|s| !s.trim().is_empty()) {
            self.paths.feedback_log = PathBuf::from(p.trim());
        }
        if let Some(a) = lookup(ENV_DEFAULT_ALPHA).and_then(|s| s.trim().parse::<f64>().ok()) {
            self.scoring.default_alpha = sanitize_alpha(a);
        }
        if let Some(secs) = lookup(ENV_MODEL_RELOAD).and_then(|s| s.trim().parse::<u64>().ok()) {
            self.server.model_reload_secs = secs;
        }
        if let Some(on) = lookup(ENV_METRICS).and_then(|s| parse_flag(&s)) {
            self.server.metrics = on;
        }
    }

    /// Engine with the configured rule table and domain list.
    pub fn build_engine(&self) -> ScoreEngine {
        let weights = match &self.scoring.rule_weights_path {
            Some(p) => load_weights_file(p).unwrap_or_else(|e| {
                warn!(target: "engine", path = %p.display(), error = %e, "rule weights unreadable; using defaults");
                RuleWeights::default()
            }),
            None => RuleWeights::default(),
        };
        let domains = match &self.scoring.reputable_domains_path {
            Some(p) => ReputableDomains::load_from_file(p),
            None => ReputableDomains::default_seed(),
        };
        ScoreEngine::new(weights, domains).with_top_n(self.scoring.top_n_model_features)
    }
}

fn sanitize_alpha(a: f64) -> f64 {
    if a.is_finite() {
        a.clamp(0.0, 1.0)
    } else {
        DEFAULT_ALPHA
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
