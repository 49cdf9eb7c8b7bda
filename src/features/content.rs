//! Content signals derived from fetched HTML.
//!
//! Parsing is deliberately tolerant: anything we cannot make sense of yields
//! neutral (zero) signals instead of an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").expect("paragraph regex"));
static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("script regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("tag regex"));
static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta regex"));
static TIME_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<time\b([^>]*)>(.*?)</time\s*>").expect("time regex"));
static ATTR_NAME: Lazy<Regex> = Lazy::new(|| attr_regex("name"));
static ATTR_PROPERTY: Lazy<Regex> = Lazy::new(|| attr_regex("property"));
static ATTR_CONTENT: Lazy<Regex> = Lazy::new(|| attr_regex("content"));
static ATTR_DATETIME: Lazy<Regex> = Lazy::new(|| attr_regex("datetime"));
static LOOSE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(19\d{2}|20\d{2})[-/.](\d{1,2})[-/.](\d{1,2})").expect("date regex")
});
static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+").expect("sentence regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{2,}\b").expect("word regex"));
static CITATION_BRACKET: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\d+\]").expect("bracket regex"));
static DOI_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bdoi\b").expect("doi word regex"));
static REFERENCE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(references?|citations?|journal|volume|issue|pmid)\b")
        .expect("reference regex")
});

const RESEARCH_KEYWORDS: &[&str] = &["research", "study", "evidence", "source", "analysis"];
const COMMERCIAL_KEYWORDS: &[&str] = &["advertisement", "sponsored", "buy now"];
const DATE_META_KEYS: &[&str] = &["date", "article:published_time", "pubdate"];

/// Content-derived signals. `Default` is the neutral "no content" value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentSignals {
    pub has_content: bool,
    pub citation_markers: u32,
    pub doi_mentions: u32,
    pub reference_keywords: u32,
    /// Citation-like markers per 1000 words.
    pub citation_density: f64,
    pub research_keywords: bool,
    pub commercial_bias: bool,
    pub avg_words_per_sentence: f64,
    pub avg_chars_per_word: f64,
    pub content_length: u32,
    pub readability_index: f64,
    pub days_since_published: Option<f64>,
}

pub fn extract_content_signals(html: &str, now: DateTime<Utc>) -> ContentSignals {
    let text = visible_text(html);
    if text.trim().is_empty() {
        return ContentSignals::default();
    }
    let lower = text.to_ascii_lowercase();

    let citation_markers = CITATION_BRACKET.find_iter(&text).count() as u32;
    let doi_mentions = DOI_WORD.find_iter(&text).count() as u32;
    let reference_keywords = REFERENCE_WORD.find_iter(&text).count() as u32;

    let r = readability(&text);
    let citation_density = if r.words > 0 {
        f64::from(citation_markers + doi_mentions + reference_keywords) * 1000.0 / r.words as f64
    } else {
        0.0
    };

    let days_since_published = published_at(html)
        .map(|published| ((now - published).num_seconds().max(0) as f64) / 86_400.0)
        .map(f64::floor);

    ContentSignals {
        has_content: true,
        citation_markers,
        doi_mentions,
        reference_keywords,
        citation_density,
        research_keywords: RESEARCH_KEYWORDS.iter().any(|k| lower.contains(k)),
        commercial_bias: COMMERCIAL_KEYWORDS.iter().any(|k| lower.contains(k)),
        avg_words_per_sentence: r.words_per_sentence,
        avg_chars_per_word: r.chars_per_word,
        content_length: r.words as u32,
        readability_index: r.index,
        days_since_published,
    }
}

/// Paragraph text if the page has any, otherwise the whole document minus scripts.
fn visible_text(html: &str) -> String {
    let paragraphs: Vec<String> = PARAGRAPH
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| strip_tags(m.as_str()))
        .filter(|p| !p.is_empty())
        .collect();
    if !paragraphs.is_empty() {
        return paragraphs.join(" ");
    }
    let without_scripts = SCRIPT_STYLE.replace_all(html, " ");
    strip_tags(&without_scripts)
}

fn strip_tags(fragment: &str) -> String {
    let no_tags = TAG.replace_all(fragment, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Readability {
    words: usize,
    words_per_sentence: f64,
    chars_per_word: f64,
    index: f64,
}

/// Automated Readability Index over plain text.
fn readability(text: &str) -> Readability {
    let sentences = SENTENCE_SPLIT
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let words: Vec<&str> = WORD.find_iter(text).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return Readability {
            words: 0,
            words_per_sentence: 0.0,
            chars_per_word: 0.0,
            index: 0.0,
        };
    }
    let n = words.len() as f64;
    let wps = n / sentences as f64;
    let cpw = words.iter().map(|w| w.len()).sum::<usize>() as f64 / n;
    Readability {
        words: words.len(),
        words_per_sentence: wps,
        chars_per_word: cpw,
        index: 4.71 * cpw + 0.5 * wps - 21.43,
    }
}

/// Publication timestamp from `<meta>` date keys, then `<time>` tags.
fn published_at(html: &str) -> Option<DateTime<Utc>> {
    for tag in META_TAG.find_iter(html) {
        let tag = tag.as_str();
        let key = attr(tag, &ATTR_NAME).or_else(|| attr(tag, &ATTR_PROPERTY));
        let is_date_key = key
            .map(|k| DATE_META_KEYS.iter().any(|d| k.eq_ignore_ascii_case(d)))
            .unwrap_or(false);
        if !is_date_key {
            continue;
        }
        if let Some(dt) = attr(tag, &ATTR_CONTENT).and_then(|c| parse_date(&c)) {
            return Some(dt);
        }
    }
    for caps in TIME_TAG.captures_iter(html) {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let inner = caps.get(2).map(|m| strip_tags(m.as_str())).unwrap_or_default();
        let candidate = attr(attrs, &ATTR_DATETIME).unwrap_or(inner);
        if let Some(dt) = parse_date(&candidate) {
            return Some(dt);
        }
    }
    None
}

fn attr_regex(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)\b{name}\s*=\s*(?:"([^"]*)"|'([^']*)')"#
    ))
    .expect("attribute regex")
}

fn attr(tag: &str, re: &Regex) -> Option<String> {
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    let caps = LOOSE_DATE.captures(s)?;
    let y: i32 = caps[1].parse().ok()?;
    let m: u32 = caps[2].parse().ok()?;
    let d: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)?
        .and_hms_opt(0, 0, 0)
        .map(|n| n.and_utc())
}
