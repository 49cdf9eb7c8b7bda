//! Serialized logistic-regression artifact and its inference path.
//!
//! The artifact carries its own feature schema. Coefficients live in
//! standardized space: `z_i = (x_i - mean_i) / scale_i`, and the probability is
//! `sigmoid((intercept + Σ coef_i·z_i) / temperature)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CredibilityError, Result};
use crate::features::FeatureVector;

pub const ARTIFACT_VERSION: u32 = 1;

/// Score used whenever no usable model is available.
pub const FALLBACK_MODEL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub training_size: usize,
    pub positives: usize,
    pub negatives: usize,
    #[serde(default)]
    pub skipped_rows: usize,
    /// 0 when cross-validation was skipped.
    pub cv_folds: usize,
    pub cv_accuracy: Option<f64>,
    pub cv_log_loss: Option<f64>,
    pub seed: u64,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub schema: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    pub metadata: TrainingMetadata,
}

fn default_temperature() -> f64 {
    1.0
}

/// A feature's signed share of the model logit for one input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelContribution {
    pub feature: String,
    pub coefficient: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub probability: f64,
    /// Sorted by |contribution|, descending.
    pub contributions: Vec<ModelContribution>,
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl ModelArtifact {
    /// Structural checks; a failing artifact must not be used for scoring.
    pub fn validate(&self) -> Result<()> {
        if self.version != ARTIFACT_VERSION {
            return Err(CredibilityError::model_load(format!(
                "unsupported artifact version {} (expected {})",
                self.version, ARTIFACT_VERSION
            )));
        }
        let n = self.schema.len();
        if n == 0 {
            return Err(CredibilityError::model_load("empty feature schema"));
        }
        if self.means.len() != n || self.scales.len() != n || self.coefficients.len() != n {
            return Err(CredibilityError::model_load(format!(
                "schema has {n} features but means/scales/coefficients have {}/{}/{}",
                self.means.len(),
                self.scales.len(),
                self.coefficients.len()
            )));
        }
        let all_finite = self
            .means
            .iter()
            .chain(&self.scales)
            .chain(&self.coefficients)
            .chain([&self.intercept, &self.temperature])
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(CredibilityError::model_load("non-finite parameter in artifact"));
        }
        if self.scales.iter().any(|s| *s <= 0.0) || self.temperature <= 0.0 {
            return Err(CredibilityError::model_load(
                "scales and temperature must be positive",
            ));
        }
        Ok(())
    }

    /// Logit for raw (unscaled) values given in schema order.
    pub fn logit(&self, raw: &[f64]) -> f64 {
        let z: f64 = raw
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .zip(&self.coefficients)
            .map(|(((x, m), s), c)| c * (x - m) / s)
            .sum();
        (self.intercept + z) / self.temperature
    }

    /// Probability of "credible" for a feature vector.
    ///
    /// Fails with `ModelLoad` when the vector cannot satisfy the schema.
    pub fn predict(&self, features: &FeatureVector) -> Result<ModelOutput> {
        self.validate()?;
        let raw = features.values_for(&self.schema).ok_or_else(|| {
            let missing: Vec<&str> = self
                .schema
                .iter()
                .filter(|n| features.get(n).is_none())
                .map(String::as_str)
                .collect();
            CredibilityError::model_load(format!(
                "feature schema mismatch, unknown features: {}",
                missing.join(", ")
            ))
        })?;

        let mut contributions: Vec<ModelContribution> = self
            .schema
            .iter()
            .zip(&raw)
            .zip(self.means.iter().zip(&self.scales))
            .zip(&self.coefficients)
            .map(|(((name, x), (m, s)), c)| ModelContribution {
                feature: name.clone(),
                coefficient: *c,
                contribution: c * (x - m) / s,
            })
            .collect();
        contributions.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(ModelOutput {
            probability: sigmoid(self.logit(&raw)).clamp(0.0, 1.0),
            contributions,
        })
    }
}
