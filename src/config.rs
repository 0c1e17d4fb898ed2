//! Server configuration from environment variables

use crate::orchestrator::DEFAULT_HISTORY_SCAN_LIMIT;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    /// Model gateway URL; without one the pipeline never wires
    pub model_gateway: Option<String>,
    pub model_timeout: Duration,
    pub history_scan_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            model_gateway: None,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            history_scan_limit: DEFAULT_HISTORY_SCAN_LIMIT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        Self {
            port: lookup("PARLEY_PORT")
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(defaults.port),
            model_gateway: lookup("PARLEY_MODEL_GATEWAY")
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            model_timeout: parsed("PARLEY_MODEL_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map_or(defaults.model_timeout, Duration::from_secs),
            history_scan_limit: parsed("PARLEY_HISTORY_SCAN_LIMIT")
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_scan_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        assert_eq!(config(&[]), ServerConfig::default());
        assert_eq!(ServerConfig::default().port, 8000);
        assert_eq!(ServerConfig::default().history_scan_limit, 50);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PARLEY_PORT", "9000"),
            ("PARLEY_MODEL_GATEWAY", " http://localhost:4000/v1/chat "),
            ("PARLEY_MODEL_TIMEOUT_SECS", "30"),
            ("PARLEY_HISTORY_SCAN_LIMIT", "200"),
        ]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.model_gateway.as_deref(), Some("http://localhost:4000/v1/chat"));
        assert_eq!(cfg.model_timeout, Duration::from_secs(30));
        assert_eq!(cfg.history_scan_limit, 200);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = config(&[
            ("PARLEY_PORT", "not-a-port"),
            ("PARLEY_MODEL_GATEWAY", "   "),
            ("PARLEY_MODEL_TIMEOUT_SECS", "0"),
            ("PARLEY_HISTORY_SCAN_LIMIT", "-3"),
        ]);
        assert_eq!(cfg, ServerConfig::default());
    }
}
