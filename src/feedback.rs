//! Feedback log: user-supplied credibility labels attached to scored URLs.
//!
//! Two on-disk formats, picked by file extension:
//! - JSON lines (`.jsonl`, `.json`, anything else):
//!   `{"url": "...", "label": "Credible", "timestamp": "2025-03-01T10:00:00Z", "features": {...}}`
//! - CSV (`.csv`): header with at least `url,label`; optional `timestamp`; any
//!   other column is read as a numeric feature snapshot.
//!
//! Rows that cannot be turned into a labelled record are skipped and reported,
//! never silently coerced.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::warn;

use crate::error::{CredibilityError, Result};

pub const DEFAULT_FEEDBACK_PATH: &str = "data/feedback.jsonl";

/// Largest feature magnitude accepted in a snapshot; keeps column variances finite.
pub const MAX_FEATURE_MAGNITUDE: f64 = 1e9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    NotCredible,
    Credible,
}

impl Label {
    /// Binary target used for fitting.
    pub fn target(self) -> f64 {
        match self {
            Label::Credible => 1.0,
            Label::NotCredible => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Credible => "Credible",
            Label::NotCredible => "Not Credible",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    /// Case-insensitive match against a fixed set of literals.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let norm = s
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match norm.as_str() {
            "credible" | "1" | "true" | "trustworthy" => Ok(Label::Credible),
            "not credible" | "notcredible" | "0" | "false" | "untrustworthy" => {
                Ok(Label::NotCredible)
            }
            _ => Err(format!("unrecognized label `{}`", s.trim())),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let v = serde_json::Value::deserialize(deserializer)?;
        label_from_value(&v).map_err(serde::de::Error::custom)
    }
}

/// Label from a JSON string, bool, or 0/1 number.
pub fn label_from_value(v: &serde_json::Value) -> std::result::Result<Label, String> {
    match v {
        serde_json::Value::String(s) => s.parse(),
        serde_json::Value::Bool(b) => Ok(if *b { Label::Credible } else { Label::NotCredible }),
        serde_json::Value::Number(n) => n.to_string().parse(),
        other => Err(format!("unsupported label value {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub url: String,
    pub label: Label,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Feature snapshot taken at scoring time, if the caller kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<String, f64>>,
}

impl FeedbackRecord {
    pub fn new(url: impl Into<String>, label: Label) -> Self {
        Self {
            url: url.into(),
            label,
            timestamp: None,
            features: None,
        }
    }
}

/// Parsed log: valid records plus the rows that were skipped.
#[derive(Debug, Default)]
pub struct FeedbackLog {
    pub records: Vec<FeedbackRecord>,
    /// `CredibilityError::DataFormat` per skipped row.
    pub skipped: Vec<CredibilityError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    JsonLines,
    Csv,
}

impl LogFormat {
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") => LogFormat::Csv,
            _ => LogFormat::JsonLines,
        }
    }
}

pub fn load_feedback_log(path: &Path) -> Result<FeedbackLog> {
    let content = fs::read_to_string(path)?;
    let log = match LogFormat::for_path(path) {
        LogFormat::Csv => parse_csv(&content),
        LogFormat::JsonLines => parse_jsonl(&content),
    };
    for e in &log.skipped {
        warn!(target: "retrain", path = %path.display(), error = %e, "skipping feedback row");
    }
    Ok(log)
}

pub fn parse_jsonl(content: &str) -> FeedbackLog {
    let mut log = FeedbackLog::default();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        match parse_json_row(line) {
            Ok(r) => log.records.push(r),
            Err(reason) => log
                .skipped
                .push(CredibilityError::data_format(line_no, reason)),
        }
    }
    log
}

fn parse_json_row(line: &str) -> std::result::Result<FeedbackRecord, String> {
    #[derive(Deserialize)]
    struct RawRow {
        url: Option<String>,
        label: Option<serde_json::Value>,
        timestamp: Option<String>,
        features: Option<BTreeMap<String, f64>>,
    }

    let raw: RawRow = serde_json::from_str(line).map_err(|e| format!("invalid json: {e}"))?;
    let url = non_empty_url(raw.url.as_deref())?;
    let label = match raw.label {
        Some(v) => label_from_value(&v)?,
        None => return Err("missing label".to_string()),
    };
    Ok(FeedbackRecord {
        url,
        label,
        timestamp: parse_timestamp(raw.timestamp.as_deref())?,
        features: match raw.features {
            Some(snapshot) => {
                check_snapshot(&snapshot)?;
                Some(snapshot)
            }
            None => None,
        },
    })
}

fn check_feature_value(name: &str, v: f64) -> std::result::Result<f64, String> {
    if v.is_finite() && v.abs() <= MAX_FEATURE_MAGNITUDE {
        Ok(v)
    } else {
        Err(format!("feature `{name}` is out of range: {v}"))
    }
}

/// Every value finite and within `MAX_FEATURE_MAGNITUDE`.
pub fn check_snapshot(snapshot: &BTreeMap<String, f64>) -> std::result::Result<(), String> {
    for (name, v) in snapshot {
        check_feature_value(name, *v)?;
    }
    Ok(())
}

pub fn parse_csv(content: &str) -> FeedbackLog {
    let mut log = FeedbackLog::default();
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((header_idx, header_line)) = lines.next() else {
        return log;
    };
    let header: Vec<String> = split_csv_line(header_line)
        .into_iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();
    let col = |name: &str| header.iter().position(|h| h == name);
    let (Some(url_col), Some(label_col)) = (col("url"), col("label")) else {
        log.skipped.push(CredibilityError::data_format(
            header_idx + 1,
            "csv header must contain `url` and `label` columns",
        ));
        return log;
    };
    let ts_col = col("timestamp");
    let feature_cols: Vec<(usize, &str)> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != url_col && *i != label_col && Some(*i) != ts_col)
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    for (idx, line) in lines {
        let line_no = idx + 1;
        let cells = split_csv_line(line);
        if cells.len() != header.len() {
            log.skipped.push(CredibilityError::data_format(
                line_no,
                format!("expected {} columns, found {}", header.len(), cells.len()),
            ));
            continue;
        }
        match csv_row(&cells, url_col, label_col, ts_col, &feature_cols) {
            Ok(r) => log.records.push(r),
            Err(reason) => log
                .skipped
                .push(CredibilityError::data_format(line_no, reason)),
        }
    }
    log
}

fn csv_row(
    cells: &[String],
    url_col: usize,
    label_col: usize,
    ts_col: Option<usize>,
    feature_cols: &[(usize, &str)],
) -> std::result::Result<FeedbackRecord, String> {
    let url = non_empty_url(Some(&cells[url_col]))?;
    let label: Label = cells[label_col].parse()?;
    let timestamp = parse_timestamp(ts_col.map(|i| cells[i].as_str()))?;

    let mut snapshot = BTreeMap::new();
    for (i, name) in feature_cols {
        let cell = cells[*i].trim();
        if cell.is_empty() {
            continue;
        }
        let v: f64 = cell
            .parse()
            .map_err(|_| format!("feature `{name}` is not numeric: `{cell}`"))?;
        let v = check_feature_value(name, v)?;
        snapshot.insert(name.to_string(), v);
    }

    Ok(FeedbackRecord {
        url,
        label,
        timestamp,
        features: (!snapshot.is_empty()).then_some(snapshot),
    })
}

/// Split one CSV line, honouring double-quoted fields and `""` escapes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cur.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => out.push(std::mem::take(&mut cur)),
            _ => cur.push(ch),
        }
    }
    out.push(cur);
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn non_empty_url(url: Option<&str>) -> std::result::Result<String, String> {
    match url.map(str::trim) {
        Some(u) if !u.is_empty() => Ok(u.to_string()),
        _ => Err("missing url".to_string()),
    }
}

fn parse_timestamp(raw: Option<&str>) -> std::result::Result<Option<DateTime<Utc>>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid timestamp `{s}`: {e}")),
    }
}

/// Append one record to the log, creating the file (and CSV header) if needed.
pub fn append_record(path: &Path, record: &FeedbackRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let is_new = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let mut f = OpenOptions::new().create(true).append(true).open(path)?;

    match LogFormat::for_path(path) {
        LogFormat::JsonLines => {
            let mut line = serde_json::to_string(record)?;
            line.push('\n');
            f.write_all(line.as_bytes())?;
        }
        LogFormat::Csv => {
            if is_new {
                f.write_all(b"url,label,timestamp\n")?;
            }
            if record.features.is_some() {
                warn!(target: "api", "csv feedback log keeps no feature snapshot; dropping it");
            }
            let ts = record.timestamp.map(|t| t.to_rfc3339()).unwrap_or_default();
            let row = format!(
                "{},{},{}\n",
                csv_escape(&record.url),
                csv_escape(record.label.as_str()),
                ts
            );
            f.write_all(row.as_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_literals() {
        for s in ["Credible", " CREDIBLE ", "1", "true", "Trustworthy"] {
            assert_eq!(s.parse::<Label>(), Ok(Label::Credible), "{s}");
        }
        for s in ["Not Credible", "not_credible", "NOT-CREDIBLE", "notcredible", "0", "false"] {
            assert_eq!(s.parse::<Label>(), Ok(Label::NotCredible), "{s}");
        }
        for s in ["", "maybe", "credible?", "2", "somewhat credible"] {
            assert!(s.parse::<Label>().is_err(), "{s}");
        }
    }

    #[test]
    fn jsonl_skips_bad_rows_and_reports_lines() {
        let content = r#"{"url":"https://who.int/a","label":"Credible"}
not json at all

{"url":"https://x.example","label":"Unsure"}
{"url":"","label":"Credible"}
{"url":"http://blog.example/p","label":0,"timestamp":"2025-01-02T03:04:05Z","features":{"uses_https":0.0}}
{"url":"https://y.example","label":"Credible","timestamp":"yesterday"}
"#;
        let log = parse_jsonl(content);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.skipped.len(), 4);
        let lines: Vec<usize> = log
            .skipped
            .iter()
            .map(|e| match e {
                CredibilityError::DataFormat { line, .. } => *line,
                _ => 0,
            })
            .collect();
        assert_eq!(lines, vec![2, 4, 5, 7]);

        let second = &log.records[1];
        assert_eq!(second.label, Label::NotCredible);
        assert!(second.timestamp.is_some());
        assert_eq!(second.features.as_ref().unwrap()["uses_https"], 0.0);
    }

    #[test]
    fn csv_with_quotes_and_feature_columns() {
        let content = "url,label,timestamp,uses_https\n\
https://who.int/a,Credible,,1\n\
\"https://x.example/q?a=1,2\",\"Not Credible\",2025-01-01T00:00:00Z,\n\
https://y.example,Credible\n\
https://z.example,Credible,,yes\n";
        let log = parse_csv(content);
        assert_eq!(log.records.len(), 2);
        assert_eq!(log.skipped.len(), 2);
        assert_eq!(log.records[0].features.as_ref().unwrap()["uses_https"], 1.0);
        assert_eq!(log.records[1].url, "https://x.example/q?a=1,2");
        assert!(log.records[1].features.is_none());
    }

    #[test]
    fn non_finite_or_huge_feature_values_skip_the_row() {
        let csv = "url,label,timestamp,uses_https\n\
https://who.int/a,Credible,,1\n\
https://x.example/q,Credible,,NaN\n\
https://y.example/q,Credible,,inf\n\
https://z.example/q,Credible,,1e308\n";
        let log = parse_csv(csv);
        assert_eq!(log.records.len(), 1);
        assert_eq!(log.skipped.len(), 3);

        let jsonl = r#"{"url":"https://who.int/a","label":"Credible","features":{"uses_https":1.0}}
{"url":"https://x.example","label":"Credible","features":{"uses_https":1e308}}
{"url":"https://y.example","label":"Credible","features":{"uses_https":-2e9}}
"#;
        let log = parse_jsonl(jsonl);
        assert_eq!(log.records.len(), 1);
        let lines: Vec<usize> = log
            .skipped
            .iter()
            .map(|e| match e {
                CredibilityError::DataFormat { line, .. } => *line,
                _ => 0,
            })
            .collect();
        assert_eq!(lines, vec![2, 3]);

        let mut snapshot = BTreeMap::new();
        snapshot.insert("uses_https".to_string(), f64::NAN);
        assert!(check_snapshot(&snapshot).is_err());
        snapshot.insert("uses_https".to_string(), MAX_FEATURE_MAGNITUDE);
        assert!(check_snapshot(&snapshot).is_ok());
    }

    #[test]
    fn csv_without_required_columns_reports_header() {
        let log = parse_csv("link,verdict\nhttps://a.org,Credible\n");
        assert!(log.records.is_empty());
        assert_eq!(log.skipped.len(), 1);
    }

    #[test]
    fn append_then_load_roundtrips_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["log.jsonl", "log.csv"] {
            let path = dir.path().join("sub").join(name);
            let mut r = FeedbackRecord::new("https://who.int/a,b", Label::Credible);
            r.timestamp = Some(Utc::now());
            append_record(&path, &r).unwrap();
            append_record(&path, &FeedbackRecord::new("http://x.example", Label::NotCredible))
                .unwrap();
            let log = load_feedback_log(&path).unwrap();
            assert!(log.skipped.is_empty(), "{name}: {:?}", log.skipped);
            assert_eq!(log.records.len(), 2, "{name}");
            assert_eq!(log.records[0].url, "https://who.int/a,b");
            assert_eq!(log.records[1].label, Label::NotCredible);
        }
    }
}
