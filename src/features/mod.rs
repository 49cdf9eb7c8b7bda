//! Feature extraction: URL structure plus optional page content, flattened into
//! a named `FeatureVector` that both the rule table and the model consume.

pub mod content;
pub mod structure;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domains::TldCategory;
pub use content::{extract_content_signals, ContentSignals};
pub use structure::{extract_url_signals, parse_request_url, UrlSignals};

/// Canonical feature names, in the order a freshly trained model expects them.
pub const FEATURE_NAMES: [&str; 20] = [
    "rule_score",
    "uses_https",
    "institutional_tld",
    "reputable_domain",
    "doi_in_path",
    "blog_signal",
    "tracking_params",
    "short_host",
    "citation_markers",
    "doi_mentions",
    "reference_keywords",
    "citation_density",
    "research_keywords",
    "commercial_bias",
    "avg_words_per_sentence",
    "avg_chars_per_word",
    "content_length",
    "readability_index",
    "days_since_published",
    "has_content",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub tld_category: TldCategory,
    pub rule_score: f64,
    pub uses_https: f64,
    pub institutional_tld: f64,
    pub reputable_domain: f64,
    pub doi_in_path: f64,
    pub blog_signal: f64,
    pub tracking_params: f64,
    pub short_host: f64,
    pub citation_markers: f64,
    pub doi_mentions: f64,
    pub reference_keywords: f64,
    pub citation_density: f64,
    pub research_keywords: f64,
    pub commercial_bias: f64,
    pub avg_words_per_sentence: f64,
    pub avg_chars_per_word: f64,
    pub content_length: f64,
    pub readability_index: f64,
    pub days_since_published: f64,
    pub has_content: f64,
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl FeatureVector {
    pub fn assemble(url: &UrlSignals, content: &ContentSignals, rule_score: f64) -> Self {
        Self {
            tld_category: url.tld_category,
            rule_score,
            uses_https: flag(url.uses_https),
            institutional_tld: flag(url.institutional_tld()),
            reputable_domain: flag(url.reputable_domain),
            doi_in_path: flag(url.doi_in_path),
            blog_signal: f64::from(url.blog_hits),
            tracking_params: flag(url.tracking_params),
            short_host: flag(url.short_host),
            citation_markers: f64::from(content.citation_markers),
            doi_mentions: f64::from(content.doi_mentions),
            reference_keywords: f64::from(content.reference_keywords),
            citation_density: content.citation_density,
            research_keywords: flag(content.research_keywords),
            commercial_bias: flag(content.commercial_bias),
            avg_words_per_sentence: content.avg_words_per_sentence,
            avg_chars_per_word: content.avg_chars_per_word,
            content_length: f64::from(content.content_length),
            readability_index: content.readability_index,
            // unknown publication date imputes to 0, like every other absent signal
            days_since_published: content.days_since_published.unwrap_or(0.0),
            has_content: flag(content.has_content),
        }
    }

    /// Look a feature up by its schema name.
    pub fn get(&self, name: &str) -> Option<f64> {
        let v = match name {
            "rule_score" => self.rule_score,
            "uses_https" => self.uses_https,
            "institutional_tld" => self.institutional_tld,
            "reputable_domain" => self.reputable_domain,
            "doi_in_path" => self.doi_in_path,
            "blog_signal" => self.blog_signal,
            "tracking_params" => self.tracking_params,
            "short_host" => self.short_host,
            "citation_markers" => self.citation_markers,
            "doi_mentions" => self.doi_mentions,
            "reference_keywords" => self.reference_keywords,
            "citation_density" => self.citation_density,
            "research_keywords" => self.research_keywords,
            "commercial_bias" => self.commercial_bias,
            "avg_words_per_sentence" => self.avg_words_per_sentence,
            "avg_chars_per_word" => self.avg_chars_per_word,
            "content_length" => self.content_length,
            "readability_index" => self.readability_index,
            "days_since_published" => self.days_since_published,
            "has_content" => self.has_content,
            _ => return None,
        };
        Some(v)
    }

    /// Values in `schema` order; `None` if any name is unknown.
    pub fn values_for(&self, schema: &[String]) -> Option<Vec<f64>> {
        schema.iter().map(|name| self.get(name)).collect()
    }

    /// Snapshot suitable for a feedback record.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .filter_map(|n| self.get(n).map(|v| (n.to_string(), v)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::ReputableDomains;

    fn sample() -> FeatureVector {
        let url = parse_request_url("https://www.nih.gov/article").unwrap();
        let sig = extract_url_signals(&url, &ReputableDomains::default_seed());
        FeatureVector::assemble(&sig, &ContentSignals::default(), 0.85)
    }

    #[test]
    fn every_canonical_name_resolves() {
        let fv = sample();
        for name in FEATURE_NAMES {
            assert!(fv.get(name).is_some(), "missing feature {name}");
        }
        assert_eq!(fv.to_map().len(), FEATURE_NAMES.len());
    }

    #[test]
    fn schema_order_is_respected() {
        let fv = sample();
        let schema = vec!["uses_https".to_string(), "rule_score".to_string()];
        assert_eq!(fv.values_for(&schema), Some(vec![1.0, 0.85]));
    }

    #[test]
    fn unknown_schema_name_is_unsatisfiable() {
        let fv = sample();
        let schema = vec!["uses_https".to_string(), "page_rank".to_string()];
        assert_eq!(fv.values_for(&schema), None);
    }
}
