//! Page fetching for content-aware scoring.
//!
//! Fetching never fails a scoring request: any transport or status problem is
//! logged and reported as "no content".

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::telemetry::anon_hash;

pub const DEFAULT_USER_AGENT: &str =
    "credibility-insight/0.1 (+https://github.com/credibility-insight)";

/// Upper bound on the body we keep; larger pages are truncated.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    /// HTML body, or `None` if the page could not be retrieved.
    async fn fetch(&self, url: &str) -> Option<String>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_ms: u64,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            timeout_ms: 8_000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

pub struct ReqwestFetcher {
    http: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(cfg: &FetchConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HtmlFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let url_id = anon_hash(url);
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "engine", %url_id, error = %e, "page fetch failed");
                metrics::counter!("credibility_fetch_errors_total").increment(1);
                return None;
            }
        };
        if !resp.status().is_success() {
            warn!(target: "engine", %url_id, status = %resp.status(), "page fetch returned error status");
            metrics::counter!("credibility_fetch_errors_total").increment(1);
            return None;
        }
        match resp.text().await {
            Ok(mut body) => {
                if body.len() > MAX_BODY_BYTES {
                    let mut cut = MAX_BODY_BYTES;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                debug!(target: "engine", %url_id, bytes = body.len(), "page fetched");
                Some(body)
            }
            Err(e) => {
                warn!(target: "engine", %url_id, error = %e, "page body unreadable");
                metrics::counter!("credibility_fetch_errors_total").increment(1);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

/// Fetcher that never touches the network; used when fetching is disabled.
pub struct NoopFetcher;

#[async_trait]
impl HtmlFetcher for NoopFetcher {
    async fn fetch(&self, _url: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Serves a fixed page for every URL.
pub struct StaticFetcher {
    html: String,
}

impl StaticFetcher {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl HtmlFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Option<String> {
        Some(self.html.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_and_static_fetchers() {
        assert_eq!(NoopFetcher.fetch("https://example.com").await, None);
        let f = StaticFetcher::new("<p>hi</p>");
        assert_eq!(f.fetch("https://example.com").await.as_deref(), Some("<p>hi</p>"));
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(ReqwestFetcher::new(&FetchConfig::default()).is_ok());
    }
}
