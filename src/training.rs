//! Deterministic logistic-regression fitting with stratified cross-validation
//! and temperature calibration.
//!
//! - Columns are standardized (population std; constant columns keep scale 1).
//! - L2-regularized log-loss, `C = 1.0` by default, minimized by full-batch
//!   gradient descent from a zero start. Same data + same config ⇒ same
//!   coefficients.
//! - Fold count adapts to the minority class: `k = min(cv_folds, min_count)`,
//!   and CV is skipped when `k < 2`.
//! - Temperature is grid-searched on out-of-fold logits over [0.5, 3.0].

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::model::sigmoid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Minimum number of valid records before a fit is attempted.
    pub min_records: usize,
    /// Desired fold count; capped by the minority class size.
    pub cv_folds: usize,
    pub seed: u64,
    pub max_iter: usize,
    pub learning_rate: f64,
    /// Inverse regularization strength.
    pub c: f64,
    pub tolerance: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_records: 10,
            cv_folds: 3,
            seed: 42,
            max_iter: 5000,
            learning_rate: 0.1,
            c: 1.0,
            tolerance: 1e-7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>], dims: usize) -> Self {
        let n = rows.len().max(1) as f64;
        let mut means = vec![0.0; dims];
        for r in rows {
            for (m, x) in means.iter_mut().zip(r) {
                *m += x;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);

        let mut scales = vec![0.0; dims];
        for r in rows {
            for ((s, x), m) in scales.iter_mut().zip(r).zip(&means) {
                *s += (x - m) * (x - m);
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > 1e-12 { std } else { 1.0 };
        }
        Self { means, scales }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((x, m), s)| (x - m) / s)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogisticFit {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

impl LogisticFit {
    pub fn logit(&self, z: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(z)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Fit on already-standardized rows. `y` holds 0.0 / 1.0 targets.
pub fn fit_logistic(z: &[Vec<f64>], y: &[f64], cfg: &TrainingConfig) -> LogisticFit {
    let dims = z.first().map(Vec::len).unwrap_or(0);
    let n = z.len().max(1) as f64;
    let lambda = 1.0 / (cfg.c.max(1e-12) * n);

    let mut w = vec![0.0; dims];
    let mut b = 0.0;
    let mut iterations = 0;

    for it in 0..cfg.max_iter {
        iterations = it + 1;
        let mut grad_w = vec![0.0; dims];
        let mut grad_b = 0.0;
        for (row, target) in z.iter().zip(y) {
            let p = sigmoid(b + w.iter().zip(row).map(|(wi, xi)| wi * xi).sum::<f64>());
            let err = p - target;
            for (g, x) in grad_w.iter_mut().zip(row) {
                *g += err * x;
            }
            grad_b += err;
        }
        let mut max_grad = (grad_b / n).abs();
        for (g, wi) in grad_w.iter_mut().zip(&w) {
            *g = *g / n + lambda * wi;
            max_grad = max_grad.max(g.abs());
        }
        for (wi, g) in w.iter_mut().zip(&grad_w) {
            *wi -= cfg.learning_rate * g;
        }
        b -= cfg.learning_rate * grad_b / n;

        if max_grad < cfg.tolerance {
            break;
        }
    }

    LogisticFit {
        coefficients: w,
        intercept: b,
        iterations,
    }
}

/// Fold count for the given class counts; 0 means "skip CV".
pub fn adaptive_folds(desired: usize, positives: usize, negatives: usize) -> usize {
    let k = desired.min(positives.min(negatives));
    if k < 2 {
        0
    } else {
        k
    }
}

/// Stratified fold id per row, from a seeded shuffle of each class.
pub fn stratified_folds(y: &[f64], k: usize, seed: u64) -> Vec<usize> {
    let mut folds = vec![0; y.len()];
    if k == 0 {
        return folds;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    for class in [0.0, 1.0] {
        let mut idx: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        idx.shuffle(&mut rng);
        for (pos, i) in idx.into_iter().enumerate() {
            folds[i] = pos % k;
        }
    }
    folds
}

pub fn log_loss(y: &[f64], p: &[f64]) -> f64 {
    let eps = 1e-15;
    let total: f64 = y
        .iter()
        .zip(p)
        .map(|(t, q)| {
            let q = q.clamp(eps, 1.0 - eps);
            -(t * q.ln() + (1.0 - t) * (1.0 - q).ln())
        })
        .sum();
    total / y.len().max(1) as f64
}

pub fn accuracy(y: &[f64], p: &[f64]) -> f64 {
    let hits = y
        .iter()
        .zip(p)
        .filter(|(t, q)| (**q >= 0.5) == (**t >= 0.5))
        .count();
    hits as f64 / y.len().max(1) as f64
}

/// Temperature minimizing log-loss of `sigmoid(logit / T)` over a 51-point grid.
pub fn fit_temperature(logits: &[f64], y: &[f64]) -> f64 {
    let mut best = (1.0, f64::INFINITY);
    for step in 0..=50 {
        let t = 0.5 + 0.05 * step as f64;
        let p: Vec<f64> = logits.iter().map(|l| sigmoid(l / t)).collect();
        let ll = log_loss(y, &p);
        if ll < best.1 {
            best = (t, ll);
        }
    }
    best.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossValidation {
    pub folds: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub temperature: f64,
}

/// Out-of-fold evaluation; `None` when there are too few rows per class.
pub fn cross_validate(rows: &[Vec<f64>], y: &[f64], cfg: &TrainingConfig) -> Option<CrossValidation> {
    let positives = y.iter().filter(|t| **t >= 0.5).count();
    let negatives = y.len() - positives;
    let k = adaptive_folds(cfg.cv_folds, positives, negatives);
    if k == 0 {
        return None;
    }
    let dims = rows.first().map(Vec::len).unwrap_or(0);
    let fold_of = stratified_folds(y, k, cfg.seed);
    let mut oof_logits = vec![0.0; y.len()];

    for fold in 0..k {
        let train_rows: Vec<Vec<f64>> = (0..rows.len())
            .filter(|&i| fold_of[i] != fold)
            .map(|i| rows[i].clone())
            .collect();
        let train_y: Vec<f64> = (0..y.len()).filter(|&i| fold_of[i] != fold).map(|i| y[i]).collect();

        let scaler = Standardizer::fit(&train_rows, dims);
        let z: Vec<Vec<f64>> = train_rows.iter().map(|r| scaler.transform(r)).collect();
        let fit = fit_logistic(&z, &train_y, cfg);

        for i in (0..rows.len()).filter(|&i| fold_of[i] == fold) {
            oof_logits[i] = fit.logit(&scaler.transform(&rows[i]));
        }
    }

    let p: Vec<f64> = oof_logits.iter().map(|l| sigmoid(*l)).collect();
    Some(CrossValidation {
        folds: k,
        accuracy: accuracy(y, &p),
        log_loss: log_loss(y, &p),
        temperature: fit_temperature(&oof_logits, y),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two informative columns plus a constant one.
    fn toy() -> (Vec<Vec<f64>>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..12 {
            let credible = i % 2 == 0;
            let jitter = (i as f64) * 0.01;
            rows.push(vec![
                if credible { 1.0 } else { 0.0 },
                if credible { 0.8 - jitter } else { 0.2 + jitter },
                3.0,
            ]);
            y.push(if credible { 1.0 } else { 0.0 });
        }
        (rows, y)
    }

    #[test]
    fn standardizer_handles_constant_columns() {
        let (rows, _) = toy();
        let s = Standardizer::fit(&rows, 3);
        assert!((s.means[0] - 0.5).abs() < 1e-12);
        assert!((s.scales[0] - 0.5).abs() < 1e-12);
        assert_eq!(s.scales[2], 1.0);
        assert_eq!(s.transform(&rows[0])[2], 0.0);
    }

    #[test]
    fn fit_separates_the_classes() {
        let (rows, y) = toy();
        let s = Standardizer::fit(&rows, 3);
        let z: Vec<Vec<f64>> = rows.iter().map(|r| s.transform(r)).collect();
        let fit = fit_logistic(&z, &y, &TrainingConfig::default());
        assert!(fit.coefficients[0] > 0.0);
        assert!(fit.coefficients[1] > 0.0);
        assert!(fit.coefficients[2].abs() < 1e-12);
        let p: Vec<f64> = z.iter().map(|r| sigmoid(fit.logit(r))).collect();
        assert_eq!(accuracy(&y, &p), 1.0);
    }

    #[test]
    fn fitting_is_deterministic() {
        let (rows, y) = toy();
        let s = Standardizer::fit(&rows, 3);
        let z: Vec<Vec<f64>> = rows.iter().map(|r| s.transform(r)).collect();
        let a = fit_logistic(&z, &y, &TrainingConfig::default());
        let b = fit_logistic(&z, &y, &TrainingConfig::default());
        assert_eq!(a, b);
    }

    #[test]
    fn folds_adapt_to_minority_class() {
        assert_eq!(adaptive_folds(3, 10, 10), 3);
        assert_eq!(adaptive_folds(5, 10, 2), 2);
        assert_eq!(adaptive_folds(3, 9, 1), 0);
    }

    #[test]
    fn stratified_folds_keep_both_classes_in_every_fold() {
        let y = vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let folds = stratified_folds(&y, 3, 7);
        for f in 0..3 {
            let has_pos = (0..y.len()).any(|i| folds[i] == f && y[i] == 1.0);
            let has_neg = (0..y.len()).any(|i| folds[i] == f && y[i] == 0.0);
            assert!(has_pos && has_neg, "fold {f} is missing a class");
        }
        assert_eq!(folds, stratified_folds(&y, 3, 7));
    }

    #[test]
    fn cross_validation_reports_metrics() {
        let (rows, y) = toy();
        let cv = cross_validate(&rows, &y, &TrainingConfig::default()).unwrap();
        assert_eq!(cv.folds, 3);
        assert!(cv.accuracy >= 0.9);
        assert!(cv.log_loss.is_finite());
        assert!((0.5..=3.0).contains(&cv.temperature));
    }

    #[test]
    fn cross_validation_skipped_with_single_minority_row() {
        let (mut rows, mut y) = toy();
        // keep one negative only
        let keep: Vec<usize> = (0..y.len()).filter(|&i| y[i] == 1.0 || i == 1).collect();
        rows = keep.iter().map(|&i| rows[i].clone()).collect();
        y = keep.iter().map(|&i| y[i]).collect();
        assert!(cross_validate(&rows, &y, &TrainingConfig::default()).is_none());
    }

    #[test]
    fn temperature_grid_bounds() {
        // perfectly separated, confident logits prefer the sharpest temperature
        let logits = vec![4.0, -4.0, 5.0, -5.0];
        let y = vec![1.0, 0.0, 1.0, 0.0];
        assert!((fit_temperature(&logits, &y) - 0.5).abs() < 1e-12);
    }
}
