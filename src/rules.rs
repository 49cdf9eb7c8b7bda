//! Rule-based credibility score: a fixed, additive weight table over URL and
//! content signals, clamped to [0,1].
//!
//! Default table:
//!
//! | signal              | weight         |
//! |---------------------|----------------|
//! | base                | +0.30          |
//! | uses_https          | +0.05          |
//! | institutional_tld   | +0.25          |
//! | reputable_domain    | +0.25          |
//! | doi_in_path         | +0.20          |
//! | blog_signal         | -0.10 per hit  |
//! | tracking_params     | -0.05          |
//! | short_host          | -0.05          |
//! | research_keywords   | +0.10          |
//! | commercial_bias     | -0.10          |
//!
//! A JSON file with the same keys may override individual weights; missing
//! keys keep their defaults.

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};

use crate::features::{ContentSignals, UrlSignals};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    pub base: f64,
    pub uses_https: f64,
    pub institutional_tld: f64,
    pub reputable_domain: f64,
    pub doi_in_path: f64,
    pub blog_signal: f64,
    pub tracking_params: f64,
    pub short_host: f64,
    pub research_keywords: f64,
    pub commercial_bias: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            base: 0.30,
            uses_https: 0.05,
            institutional_tld: 0.25,
            reputable_domain: 0.25,
            doi_in_path: 0.20,
            blog_signal: -0.10,
            tracking_params: -0.05,
            short_host: -0.05,
            research_keywords: 0.10,
            commercial_bias: -0.10,
        }
    }
}

/// Load weights directly (no caching). Public for tests/tools.
pub fn load_weights_file(path: &Path) -> io::Result<RuleWeights> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// One signal's signed contribution to the rule score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleHit {
    pub feature: &'static str,
    pub weight: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RuleOutcome {
    pub score: f64,
    /// Signals that contributed a non-zero weight, in table order (base excluded).
    pub hits: Vec<RuleHit>,
}

pub fn rule_score(url: &UrlSignals, content: &ContentSignals, w: &RuleWeights) -> RuleOutcome {
    let candidates = [
        ("uses_https", url.uses_https, w.uses_https),
        ("institutional_tld", url.institutional_tld(), w.institutional_tld),
        ("reputable_domain", url.reputable_domain, w.reputable_domain),
        ("doi_in_path", url.doi_in_path, w.doi_in_path),
        (
            "blog_signal",
            url.blog_hits > 0,
            w.blog_signal * f64::from(url.blog_hits),
        ),
        ("tracking_params", url.tracking_params, w.tracking_params),
        ("short_host", url.short_host, w.short_host),
        ("research_keywords", content.research_keywords, w.research_keywords),
        ("commercial_bias", content.commercial_bias, w.commercial_bias),
    ];

    let hits: Vec<RuleHit> = candidates
        .into_iter()
        .filter(|(_, active, weight)| *active && *weight != 0.0)
        .map(|(feature, _, weight)| RuleHit { feature, weight })
        .collect();

    let raw = w.base + hits.iter().map(|h| h.weight).sum::<f64>();
    RuleOutcome {
        score: raw.clamp(0.0, 1.0),
        hits,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::ReputableDomains;
    use crate::features::{extract_url_signals, parse_request_url};

    fn score_of(raw: &str) -> RuleOutcome {
        let url = parse_request_url(raw).unwrap();
        let sig = extract_url_signals(&url, &ReputableDomains::default_seed());
        rule_score(&sig, &ContentSignals::default(), &RuleWeights::default())
    }

    #[test]
    fn reputable_gov_over_https() {
        let r = score_of("https://www.nih.gov/article");
        assert!((r.score - 0.85).abs() < 1e-9);
        let names: Vec<_> = r.hits.iter().map(|h| h.feature).collect();
        assert_eq!(names, vec!["uses_https", "institutional_tld", "reputable_domain"]);
    }

    #[test]
    fn plain_http_blog_is_penalised() {
        let r = score_of("http://randomblog.example/post");
        assert!((r.score - 0.20).abs() < 1e-9);
        assert_eq!(r.hits.len(), 1);
        assert_eq!(r.hits[0].feature, "blog_signal");
    }

    #[test]
    fn score_is_clamped() {
        let heavy = RuleWeights {
            base: 0.9,
            uses_https: 0.9,
            ..RuleWeights::default()
        };
        let url = parse_request_url("https://example.com").unwrap();
        let sig = extract_url_signals(&url, &ReputableDomains::default_seed());
        assert_eq!(rule_score(&sig, &ContentSignals::default(), &heavy).score, 1.0);

        let harsh = RuleWeights {
            base: 0.0,
            ..RuleWeights::default()
        };
        let url = parse_request_url("http://my.blog?utm_source=x").unwrap();
        let sig = extract_url_signals(&url, &ReputableDomains::default_seed());
        assert_eq!(rule_score(&sig, &ContentSignals::default(), &harsh).score, 0.0);
    }

    #[test]
    fn content_signals_shift_the_score() {
        let url = parse_request_url("https://example.com/a").unwrap();
        let sig = extract_url_signals(&url, &ReputableDomains::default_seed());
        let content = ContentSignals {
            has_content: true,
            research_keywords: true,
            ..ContentSignals::default()
        };
        let r = rule_score(&sig, &content, &RuleWeights::default());
        assert!((r.score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn partial_override_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rule_weights.json");
        fs::write(&path, r#"{"base": 0.4}"#).unwrap();
        let w = load_weights_file(&path).unwrap();
        assert!((w.base - 0.4).abs() < 1e-12);
        assert_eq!(w.reputable_domain, RuleWeights::default().reputable_domain);
    }
}
