//! Tracing setup and log-safe identifiers.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber.
///
/// Filter comes from `RUST_LOG` (falls back to `default_filter`); output is
/// JSON when `LOG_FORMAT=json`, compact text otherwise. Safe to call twice: the
/// second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

/// Short, stable id for a URL so logs never carry the raw address.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = anon_hash("https://www.nih.gov/article");
        assert_eq!(a.len(), 12);
        assert_eq!(a, anon_hash("https://www.nih.gov/article"));
        assert_ne!(a, anon_hash("https://www.nih.gov/other"));
    }
}
