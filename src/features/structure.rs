//! Structural signals derived from the URL alone (no network).

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::domains::{normalize_host, ReputableDomains, TldCategory};
use crate::error::{CredibilityError, Result};

static DOI_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/10\.\d{4,9}/[-._;()/:a-z0-9]+").expect("doi regex"));

const BLOG_PLATFORMS: &[&str] = &["medium.com", "wordpress", "substack"];
const TRACKING_KEYS: &[&str] = &["utm_", "fbclid", "gclid"];

#[derive(Debug, Clone, PartialEq)]
pub struct UrlSignals {
    pub host: String,
    pub uses_https: bool,
    pub tld_category: TldCategory,
    pub reputable_domain: bool,
    pub doi_in_path: bool,
    /// Number of informal/blogging hits (host or path mentions, blogging platforms).
    pub blog_hits: u32,
    pub tracking_params: bool,
    pub short_host: bool,
}

impl UrlSignals {
    pub fn institutional_tld(&self) -> bool {
        self.tld_category.is_institutional()
    }
}

/// Parse and validate a request URL: absolute, http(s), with a host.
pub fn parse_request_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CredibilityError::invalid_input("url must be a non-empty string"));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| CredibilityError::invalid_input(format!("malformed url `{trimmed}`: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CredibilityError::invalid_input(format!(
                "unsupported url scheme `{other}` (expected http or https)"
            )))
        }
    }
    match url.host_str() {
        Some(h) if !h.is_empty() => Ok(url),
        _ => Err(CredibilityError::invalid_input(format!(
            "url `{trimmed}` has no host"
        ))),
    }
}

pub fn extract_url_signals(url: &Url, domains: &ReputableDomains) -> UrlSignals {
    let host = normalize_host(url.host_str().unwrap_or_default());
    let path = url.path().to_ascii_lowercase();
    let query = url.query().unwrap_or_default().to_ascii_lowercase();

    let mut blog_hits = 0;
    if host.contains("blog") || path.contains("/blog") {
        blog_hits += 1;
    }
    blog_hits += BLOG_PLATFORMS.iter().filter(|p| host.contains(*p)).count() as u32;

    UrlSignals {
        uses_https: url.scheme() == "https",
        tld_category: TldCategory::from_host(&host),
        reputable_domain: domains.is_reputable(&host),
        doi_in_path: DOI_PATH.is_match(url.path()),
        blog_hits,
        tracking_params: TRACKING_KEYS.iter().any(|k| query.contains(k)),
        short_host: host.len() < 5,
        host,
    }
}
