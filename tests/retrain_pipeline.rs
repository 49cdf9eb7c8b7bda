// tests/retrain_pipeline.rs
//
// Feedback log -> Retrainer -> artifact on disk -> ModelHandle -> ScoreEngine.

use std::fs;
use std::path::Path;

use credibility_insight::feedback::{append_record, load_feedback_log};
use credibility_insight::store::load_artifact;
use credibility_insight::training::TrainingConfig;
use credibility_insight::{
    CredibilityError, FeedbackRecord, Label, ModelHandle, Retrainer, ScoreEngine, ScoringRequest,
};

const CREDIBLE: &[&str] = &[
    "https://www.nih.gov/news-events/a",
    "https://www.cdc.gov/flu/season",
    "https://www.who.int/news-room/facts",
    "https://www.nature.com/articles/10.1038/s41586-020-2012-7",
    "https://www.ox.ac.uk/research",
    "https://www.reuters.com/world/",
];

const NOT_CREDIBLE: &[&str] = &[
    "http://randomblog.example/post",
    "https://medium.com/@someone/miracle-cure",
    "http://dailyhealth.wordpress.com/?utm_source=fb",
    "http://ab.io/deal",
    "https://truth.substack.com/p/secret?fbclid=abc",
    "http://shop.example/buy?gclid=1",
];

fn write_log(path: &Path, credible: usize, not_credible: usize) {
    for url in CREDIBLE.iter().cycle().take(credible) {
        append_record(path, &FeedbackRecord::new(*url, Label::Credible)).unwrap();
    }
    for url in NOT_CREDIBLE.iter().cycle().take(not_credible) {
        append_record(path, &FeedbackRecord::new(*url, Label::NotCredible)).unwrap();
    }
}

fn retrainer() -> Retrainer {
    Retrainer::new(ScoreEngine::default(), TrainingConfig::default())
}

#[test]
fn one_label_log_leaves_artifact_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.jsonl");
    let artifact = dir.path().join("model.json");

    // seed a valid artifact first
    write_log(&log, 8, 8);
    retrainer().run(&log, &artifact).unwrap();
    let before = fs::read(&artifact).unwrap();

    let one_label = dir.path().join("credible_only.jsonl");
    write_log(&one_label, 15, 0);
    let err = retrainer().run(&one_label, &artifact).unwrap_err();
    assert!(matches!(err, CredibilityError::InsufficientData(_)), "{err}");
    assert_eq!(fs::read(&artifact).unwrap(), before);
}

#[test]
fn two_runs_give_identical_coefficients() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.jsonl");
    write_log(&log, 9, 7);

    let a = retrainer().run(&log, &dir.path().join("a.json")).unwrap();
    let b = retrainer().run(&log, &dir.path().join("b.json")).unwrap();
    assert_eq!(a.coefficients, b.coefficients);
    assert_eq!(a.intercept, b.intercept);
    assert_eq!(a.means, b.means);
    assert_eq!(a.metadata.cv_accuracy, b.metadata.cv_accuracy);
}

#[test]
fn csv_log_with_bad_rows_trains_and_counts_skips() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.csv");
    write_log(&log, 6, 6);
    let mut content = fs::read_to_string(&log).unwrap();
    content.push_str("https://x.example/a,perhaps,\n");
    content.push_str(",Credible,\n");
    fs::write(&log, content).unwrap();

    let parsed = load_feedback_log(&log).unwrap();
    assert_eq!(parsed.records.len(), 12);
    assert_eq!(parsed.skipped.len(), 2);

    let artifact = dir.path().join("model.json");
    let model = retrainer().run(&log, &artifact).unwrap();
    assert_eq!(model.metadata.training_size, 12);
    assert_eq!(model.metadata.skipped_rows, 2);
    assert_eq!(load_artifact(&artifact).unwrap().coefficients, model.coefficients);
}

#[test]
fn non_finite_feature_cell_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.csv");
    let mut content = String::from("url,label,timestamp,uses_https\n");
    for url in CREDIBLE {
        content.push_str(&format!("{url},Credible,,1\n"));
    }
    for url in NOT_CREDIBLE {
        content.push_str(&format!("{url},Not Credible,,0\n"));
    }
    content.push_str("https://x.example/q,Credible,,NaN\n");
    fs::write(&log, content).unwrap();

    let artifact = dir.path().join("model.json");
    let model = retrainer().run(&log, &artifact).unwrap();
    assert_eq!(model.metadata.training_size, 12);
    assert_eq!(model.metadata.skipped_rows, 1);
    assert!(model.means.iter().chain(&model.scales).all(|v| v.is_finite()));

    // the saved artifact must load back
    assert!(ModelHandle::open(&artifact).snapshot().is_some());
}

#[test]
fn too_few_records_and_missing_log_fail() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.jsonl");
    write_log(&log, 3, 3);
    let artifact = dir.path().join("model.json");

    let err = retrainer().run(&log, &artifact).unwrap_err();
    assert!(matches!(err, CredibilityError::InsufficientData(_)));
    assert!(!artifact.exists());

    let err = retrainer()
        .run(&dir.path().join("absent.jsonl"), &artifact)
        .unwrap_err();
    assert!(matches!(err, CredibilityError::Io(_)));
}

#[test]
fn retrained_model_separates_seen_domains() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("feedback.jsonl");
    let artifact = dir.path().join("model.json");
    write_log(&log, 12, 12);
    retrainer().run(&log, &artifact).unwrap();

    let handle = ModelHandle::open(&artifact);
    let model = handle.snapshot().expect("artifact loads");
    let engine = ScoreEngine::default();

    let good = engine
        .score(&ScoringRequest::new("https://www.cdc.gov/flu/season"), Some(&*model), None)
        .unwrap();
    let bad = engine
        .score(&ScoringRequest::new("http://randomblog.example/post"), Some(&*model), None)
        .unwrap();
    assert!(good.model_used && bad.model_used);
    assert!(good.model_score > bad.model_score);
    assert!(good.hybrid_score > bad.hybrid_score);
}

#[test]
fn corrupt_artifact_falls_back_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("model.json");
    fs::write(&artifact, b"{\"version\": 1, \"schema\": [").unwrap();

    let handle = ModelHandle::open(&artifact);
    assert!(handle.snapshot().is_none());

    let result = ScoreEngine::default()
        .score(
            &ScoringRequest::new("https://www.nih.gov/article"),
            handle.snapshot().as_deref(),
            None,
        )
        .unwrap();
    assert_eq!(result.model_score, 0.5);
    assert!(!result.model_used);
}
