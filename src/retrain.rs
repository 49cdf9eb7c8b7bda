//! Offline retraining: feedback log in, validated artifact out.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::engine::ScoreEngine;
use crate::error::{CredibilityError, Result};
use crate::feedback::{check_snapshot, load_feedback_log, FeedbackRecord, Label};
use crate::features::FEATURE_NAMES;
use crate::model::{ModelArtifact, TrainingMetadata, ARTIFACT_VERSION};
use crate::store::save_artifact;
use crate::telemetry::anon_hash;
use crate::training::{cross_validate, fit_logistic, Standardizer, TrainingConfig};

/// Labelled design matrix in `FEATURE_NAMES` order.
#[derive(Debug, Default)]
pub struct Examples {
    pub rows: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    /// Records whose URL or feature snapshot could not be turned into a row.
    pub skipped: usize,
}

impl Examples {
    pub fn positives(&self) -> usize {
        self.targets.iter().filter(|t| **t >= 0.5).count()
    }

    pub fn negatives(&self) -> usize {
        self.targets.len() - self.positives()
    }
}

pub struct Retrainer {
    engine: ScoreEngine,
    config: TrainingConfig,
}

impl Retrainer {
    pub fn new(engine: ScoreEngine, config: TrainingConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Snapshot values win; otherwise features come from the URL alone.
    pub fn examples(&self, records: &[FeedbackRecord], now: DateTime<Utc>) -> Examples {
        let mut out = Examples::default();
        for (i, rec) in records.iter().enumerate() {
            let row = match &rec.features {
                Some(snapshot) => match check_snapshot(snapshot) {
                    Ok(()) => FEATURE_NAMES
                        .iter()
                        .map(|name| snapshot.get(*name).copied().unwrap_or(0.0))
                        .collect(),
                    Err(reason) => {
                        warn!(target: "retrain", record = i + 1, url_id = %anon_hash(&rec.url), error = %reason, "skipping record");
                        out.skipped += 1;
                        continue;
                    }
                },
                None => match self.engine.extract(&rec.url, None, now) {
                    Ok(ex) => FEATURE_NAMES
                        .iter()
                        .map(|name| ex.features.get(name).unwrap_or(0.0))
                        .collect(),
                    Err(e) => {
                        warn!(target: "retrain", record = i + 1, url_id = %anon_hash(&rec.url), error = %e, "skipping record");
                        out.skipped += 1;
                        continue;
                    }
                },
            };
            out.rows.push(row);
            out.targets.push(rec.label.target());
        }
        out
    }

    pub fn retrain(&self, records: &[FeedbackRecord]) -> Result<ModelArtifact> {
        self.retrain_at(records, Utc::now())
    }

    pub fn retrain_at(&self, records: &[FeedbackRecord], now: DateTime<Utc>) -> Result<ModelArtifact> {
        let ex = self.examples(records, now);
        let n = ex.rows.len();
        let (pos, neg) = (ex.positives(), ex.negatives());

        if n < self.config.min_records {
            return Err(CredibilityError::insufficient_data(format!(
                "need at least {} labelled records, got {n}",
                self.config.min_records
            )));
        }
        if pos == 0 || neg == 0 {
            return Err(CredibilityError::insufficient_data(format!(
                "both labels are required ({}: {pos}, {}: {neg})",
                Label::Credible,
                Label::NotCredible
            )));
        }

        let cv = cross_validate(&ex.rows, &ex.targets, &self.config);
        if cv.is_none() {
            info!(target: "retrain", positives = pos, negatives = neg, "too few rows per class; cross-validation skipped");
        }

        let scaler = Standardizer::fit(&ex.rows, FEATURE_NAMES.len());
        let z: Vec<Vec<f64>> = ex.rows.iter().map(|r| scaler.transform(r)).collect();
        let fit = fit_logistic(&z, &ex.targets, &self.config);

        info!(
            target: "retrain",
            rows = n,
            positives = pos,
            negatives = neg,
            iterations = fit.iterations,
            cv_folds = cv.as_ref().map(|c| c.folds).unwrap_or(0),
            cv_accuracy = cv.as_ref().map(|c| c.accuracy),
            "model fitted"
        );

        Ok(ModelArtifact {
            version: ARTIFACT_VERSION,
            schema: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            means: scaler.means,
            scales: scaler.scales,
            coefficients: fit.coefficients,
            intercept: fit.intercept,
            temperature: cv.as_ref().map(|c| c.temperature).unwrap_or(1.0),
            metadata: TrainingMetadata {
                training_size: n,
                positives: pos,
                negatives: neg,
                skipped_rows: ex.skipped,
                cv_folds: cv.as_ref().map(|c| c.folds).unwrap_or(0),
                cv_accuracy: cv.as_ref().map(|c| c.accuracy),
                cv_log_loss: cv.as_ref().map(|c| c.log_loss),
                seed: self.config.seed,
                trained_at: now,
            },
        })
    }

    /// Load the log, fit, and replace the artifact. On any error the previous
    /// artifact stays in place.
    pub fn run(&self, feedback: &Path, artifact: &Path) -> Result<ModelArtifact> {
        let log = load_feedback_log(feedback)?;
        if log.records.is_empty() {
            return Err(CredibilityError::insufficient_data(format!(
                "no valid rows in {} ({} skipped)",
                feedback.display(),
                log.skipped.len()
            )));
        }
        let mut model = self.retrain(&log.records)?;
        model.metadata.skipped_rows += log.skipped.len();
        save_artifact(artifact, &model)?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labelled(n: usize) -> Vec<FeedbackRecord> {
        let good = [
            "https://www.nih.gov/news/a",
            "https://www.cdc.gov/flu",
            "https://www.who.int/health-topics",
            "https://www.nature.com/articles/10.1038/xyz",
            "https://ox.ac.uk/research",
        ];
        let bad = [
            "http://randomblog.example/post",
            "https://medium.com/@someone/cure",
            "http://mysite.wordpress.com/?utm_source=x",
            "http://ab.io/deal",
            "https://news.substack.com/p/miracle?fbclid=1",
        ];
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    FeedbackRecord::new(good[(i / 2) % good.len()], Label::Credible)
                } else {
                    FeedbackRecord::new(bad[(i / 2) % bad.len()], Label::NotCredible)
                }
            })
            .collect()
    }

    fn retrainer() -> Retrainer {
        Retrainer::new(ScoreEngine::default(), TrainingConfig::default())
    }

    #[test]
    fn fits_full_schema_from_urls() {
        let model = retrainer().retrain(&labelled(12)).unwrap();
        assert_eq!(model.schema.len(), FEATURE_NAMES.len());
        assert_eq!(model.metadata.training_size, 12);
        assert_eq!(model.metadata.cv_folds, 3);
        assert!(model.metadata.cv_accuracy.is_some());
        model.validate().unwrap();

        let idx = model.schema.iter().position(|s| s == "reputable_domain").unwrap();
        assert!(model.coefficients[idx] > 0.0);
    }

    #[test]
    fn too_few_records_is_insufficient() {
        let err = retrainer().retrain(&labelled(6)).unwrap_err();
        assert!(matches!(err, CredibilityError::InsufficientData(_)));
    }

    #[test]
    fn single_label_is_insufficient() {
        let records: Vec<_> = labelled(24)
            .into_iter()
            .filter(|r| r.label == Label::Credible)
            .collect();
        let err = retrainer().retrain(&records).unwrap_err();
        assert!(matches!(err, CredibilityError::InsufficientData(_)));
        assert!(err.to_string().contains("Not Credible: 0"));
    }

    #[test]
    fn same_records_give_same_coefficients() {
        let records = labelled(14);
        let a = retrainer().retrain(&records).unwrap();
        let b = retrainer().retrain(&records).unwrap();
        assert_eq!(a.coefficients, b.coefficients);
        assert_eq!(a.intercept, b.intercept);
        assert_eq!(a.temperature, b.temperature);
    }

    #[test]
    fn snapshots_impute_missing_keys() {
        let mut rec = FeedbackRecord::new("https://anything.example", Label::Credible);
        rec.features = Some(BTreeMap::from([("uses_https".to_string(), 1.0)]));
        let ex = retrainer().examples(&[rec], Utc::now());
        assert_eq!(ex.rows[0][1], 1.0);
        assert_eq!(ex.rows[0].iter().sum::<f64>(), 1.0);
    }

    #[test]
    fn unparseable_urls_are_skipped() {
        let mut records = labelled(12);
        records.push(FeedbackRecord::new("ftp://files.example/x", Label::Credible));
        let model = retrainer().retrain(&records).unwrap();
        assert_eq!(model.metadata.training_size, 12);
        assert_eq!(model.metadata.skipped_rows, 1);
    }

    #[test]
    fn out_of_range_snapshots_are_skipped() {
        let mut records = labelled(12);
        for v in [f64::NAN, f64::INFINITY, 1e308] {
            let mut rec = FeedbackRecord::new("https://www.nih.gov/x", Label::Credible);
            rec.features = Some(BTreeMap::from([("uses_https".to_string(), v)]));
            records.push(rec);
        }
        let ex = retrainer().examples(&records, Utc::now());
        assert_eq!(ex.rows.len(), 12);
        assert_eq!(ex.skipped, 3);

        let model = retrainer().retrain(&records).unwrap();
        assert_eq!(model.metadata.skipped_rows, 3);
        assert!(model.coefficients.iter().all(|c| c.is_finite()));
        model.validate().unwrap();
    }

    #[test]
    fn minority_of_one_skips_cross_validation() {
        let mut records: Vec<_> = labelled(20)
            .into_iter()
            .filter(|r| r.label == Label::Credible)
            .collect();
        records.push(FeedbackRecord::new("http://randomblog.example/post", Label::NotCredible));
        let model = retrainer().retrain(&records).unwrap();
        assert_eq!(model.metadata.cv_folds, 0);
        assert_eq!(model.metadata.cv_accuracy, None);
        assert_eq!(model.temperature, 1.0);
    }
}
