//! Environment-driven configuration for the relay server.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// OneNET HK property-post endpoint.
pub const DEFAULT_ONENET_API_URL: &str =
    "https://www.onenet.hk.chinamobile.com:20080/fuse/http/device/thing/property/post";

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// TCP port the server listens on. Default: `3000`.
    pub port: u16,
    /// Upstream endpoint every relay call is posted to.
    pub upstream_url: String,
    /// Bound on one upstream call. `None` waits indefinitely.
    pub upstream_timeout: Option<Duration>,
    /// Directory served for paths no route matches.
    pub static_dir: PathBuf,
    /// Skip upstream TLS certificate verification.
    pub accept_invalid_certs: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            upstream_url: DEFAULT_ONENET_API_URL.to_string(),
            upstream_timeout: Some(DEFAULT_UPSTREAM_TIMEOUT),
            static_dir: PathBuf::from("."),
            accept_invalid_certs: false,
        }
    }
}

impl RelayConfig {
    /// Read `PORT`, `ONENET_API_URL`, `ONENET_TIMEOUT_SECS`, `STATIC_DIR` and
    /// `ONENET_ACCEPT_INVALID_CERTS`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let upstream_timeout = match parse_var::<u64>(&lookup, "ONENET_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.upstream_timeout,
        };

        Self {
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            upstream_url: lookup("ONENET_API_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.upstream_url),
            upstream_timeout,
            static_dir: lookup("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            accept_invalid_certs: lookup("ONENET_ACCEPT_INVALID_CERTS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(defaults.accept_invalid_certs),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_url, DEFAULT_ONENET_API_URL);
        assert_eq!(config.upstream_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.static_dir, PathBuf::from("."));
        assert!(!config.accept_invalid_certs);
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("PORT", "8081"),
            ("ONENET_API_URL", "http://127.0.0.1:9/post"),
            ("ONENET_TIMEOUT_SECS", "3"),
            ("STATIC_DIR", "/srv/www"),
            ("ONENET_ACCEPT_INVALID_CERTS", "true"),
        ]));
        assert_eq!(config.port, 8081);
        assert_eq!(config.upstream_url, "http://127.0.0.1:9/post");
        assert_eq!(config.upstream_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.static_dir, PathBuf::from("/srv/www"));
        assert!(config.accept_invalid_certs);
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = RelayConfig::from_lookup(lookup_from(&[("ONENET_TIMEOUT_SECS", "0")]));
        assert_eq!(config.upstream_timeout, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("PORT", "not-a-port"),
            ("ONENET_TIMEOUT_SECS", "-1"),
            ("ONENET_API_URL", "  "),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.upstream_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.upstream_url, DEFAULT_ONENET_API_URL);
    }
}
