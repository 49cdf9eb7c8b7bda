//! # Domain Reputation
//!
//! Maps hostnames to a reputation profile: whether the host belongs to a known
//! reputable publisher, which category it falls into, and how confident we are
//! in that classification.
//!
//! - Loads an optional JSON table (`{"domains": {"nih.gov": "Government Research Agency"}}`).
//! - Host matching is suffix based: `www.ncbi.nlm.nih.gov` matches `nih.gov`,
//!   `notnih.gov` does not.
//! - Falls back to the built-in `default_seed()` when no table is configured
//!   or the file cannot be parsed.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

/// Top-level domains treated as institutional.
pub const INSTITUTIONAL_TLDS: &[&str] = &["gov", "edu", "ac", "mil"];

/// Coarse TLD bucket of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TldCategory {
    Government,
    Education,
    Academic,
    Military,
    Nonprofit,
    Other,
}

impl TldCategory {
    pub fn from_host(host: &str) -> Self {
        match host.rsplit('.').next().unwrap_or_default() {
            "gov" => TldCategory::Government,
            "edu" => TldCategory::Education,
            "ac" => TldCategory::Academic,
            "mil" => TldCategory::Military,
            "org" => TldCategory::Nonprofit,
            _ => {
                // second-level institutional zones such as `ox.ac.uk` or `gov.uk`
                let labels: Vec<&str> = host.split('.').collect();
                match labels.len().checked_sub(2).map(|i| labels[i]) {
                    Some("gov") => TldCategory::Government,
                    Some("ac") => TldCategory::Academic,
                    Some("edu") => TldCategory::Education,
                    _ => TldCategory::Other,
                }
            }
        }
    }

    pub fn is_institutional(self) -> bool {
        matches!(
            self,
            TldCategory::Government
                | TldCategory::Education
                | TldCategory::Academic
                | TldCategory::Military
        )
    }
}

/// How much trust the domain classification alone carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainConfidence {
    High,
    Medium,
    Low,
}

/// Human-facing summary of a host's reputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainProfile {
    pub host: String,
    pub category: String,
    pub confidence: DomainConfidence,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReputableDomains {
    /// Registrable domain → category label.
    #[serde(default)]
    pub domains: BTreeMap<String, String>,
}

impl Default for ReputableDomains {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl ReputableDomains {
    /// Load the table from a JSON file, falling back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<ReputableDomains>(&s) {
                Ok(mut table) => {
                    table.domains = table
                        .domains
                        .into_iter()
                        .map(|(k, v)| (normalize_host(&k), v))
                        .filter(|(k, _)| !k.is_empty())
                        .collect();
                    table
                }
                Err(e) => {
                    tracing::warn!(target: "engine", path = %path.display(), error = %e, "reputable domain table unparseable; using built-in seed");
                    Self::default_seed()
                }
            },
            Err(_) => Self::default_seed(),
        }
    }

    /// Return the matching reputable domain and its category label.
    pub fn lookup(&self, host: &str) -> Option<(&str, &str)> {
        let h = normalize_host(host);
        self.domains
            .iter()
            .filter(|(d, _)| h == **d || h.ends_with(&format!(".{d}")))
            // prefer the most specific entry (ncbi.nlm.nih.gov over nih.gov)
            .max_by_key(|(d, _)| d.len())
            .map(|(d, c)| (d.as_str(), c.as_str()))
    }

    pub fn is_reputable(&self, host: &str) -> bool {
        self.lookup(host).is_some()
    }

    /// Build the reputation profile shown next to a score.
    pub fn profile(&self, host: &str) -> DomainProfile {
        let h = normalize_host(host);
        if let Some((_, category)) = self.lookup(&h) {
            return DomainProfile {
                category: category.to_string(),
                confidence: DomainConfidence::High,
                host: h,
            };
        }
        let (category, confidence) = match TldCategory::from_host(&h) {
            t if t.is_institutional() => ("Government / Educational", DomainConfidence::High),
            TldCategory::Nonprofit => ("Nonprofit / Organization", DomainConfidence::Medium),
            _ => ("Generic / Commercial", DomainConfidence::Low),
        };
        DomainProfile {
            host: h,
            category: category.to_string(),
            confidence,
        }
    }

    /// Built-in reputable publishers, research bodies and institutions.
    pub fn default_seed() -> Self {
        let mut domains = BTreeMap::new();
        for (d, c) in [
            ("nih.gov", "Government Research Agency"),
            ("ncbi.nlm.nih.gov", "Government Research Agency"),
            ("cdc.gov", "U.S. Government Health Agency"),
            ("who.int", "Global Health Organization"),
            ("nature.com", "Peer-Reviewed Scientific Journal"),
            ("science.org", "Peer-Reviewed Scientific Journal"),
            ("sciencedirect.com", "Peer-Reviewed Scientific Journal"),
            ("nejm.org", "Peer-Reviewed Medical Journal"),
            ("thelancet.com", "Peer-Reviewed Medical Journal"),
            ("bmj.com", "Peer-Reviewed Medical Journal"),
            ("jamanetwork.com", "Peer-Reviewed Medical Journal"),
            ("plos.org", "Open-Access Scientific Journal"),
            ("mayoclinic.org", "Health Institution"),
            ("webmd.com", "Health Information Publisher"),
            ("ox.ac.uk", "Academic Institution"),
            ("harvard.edu", "Academic Institution"),
            ("stanford.edu", "Academic Institution"),
            ("mit.edu", "Academic Institution"),
            ("nytimes.com", "Major News Publisher"),
            ("bbc.com", "International News Network"),
            ("reuters.com", "Verified News Agency"),
        ] {
            domains.insert(d.to_string(), c.to_string());
        }
        Self { domains }
    }
}

/// Lowercase, trim, strip a trailing dot and any port.
pub fn normalize_host(s: &str) -> String {
    let h = s.trim().to_ascii_lowercase();
    let h = h.split(':').next().unwrap_or_default();
    h.trim_end_matches('.').to_string()
}
