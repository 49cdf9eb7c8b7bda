//! Offline retraining job: reads the feedback log, fits a new model, and
//! atomically replaces the artifact. Exits non-zero on failure, leaving the
//! previous artifact in place.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use credibility_insight::config::AppConfig;
use credibility_insight::telemetry::init_tracing;
use credibility_insight::Retrainer;

#[derive(Debug, Parser)]
#[command(name = "credibility-retrain", about = "Fit the credibility model from user feedback")]
struct Args {
    /// Feedback log (.jsonl or .csv); defaults to the configured path
    #[arg(long)]
    feedback: Option<PathBuf>,
    /// Artifact to write; defaults to the configured path
    #[arg(long)]
    artifact: Option<PathBuf>,
    #[arg(long)]
    min_records: Option<usize>,
    #[arg(long)]
    folds: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    let args = Args::parse();
    let cfg = AppConfig::load().context("loading credibility config")?;

    let mut training = cfg.training;
    if let Some(n) = args.min_records {
        training.min_records = n;
    }
    if let Some(k) = args.folds {
        training.cv_folds = k;
    }
    if let Some(s) = args.seed {
        training.seed = s;
    }
    let feedback = args.feedback.unwrap_or_else(|| cfg.paths.feedback_log.clone());
    let artifact = args.artifact.unwrap_or_else(|| cfg.paths.artifact.clone());

    let retrainer = Retrainer::new(cfg.build_engine(), training);
    let model = retrainer
        .run(&feedback, &artifact)
        .with_context(|| format!("retraining from {}", feedback.display()))?;

    info!(
        target: "retrain",
        artifact = %artifact.display(),
        training_size = model.metadata.training_size,
        skipped_rows = model.metadata.skipped_rows,
        cv_folds = model.metadata.cv_folds,
        cv_accuracy = model.metadata.cv_accuracy,
        temperature = model.temperature,
        "artifact updated"
    );
    Ok(())
}
