//! Bridge configuration

use anyhow::{Context, Result};
use bridge_lib::messaging::StompConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Bridge configuration, read from `BRIDGE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Instance name stamped on structured log records
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// STOMP acceptor of the message bus; messaging is disabled when unset
    #[serde(default)]
    pub bus_host: Option<String>,

    #[serde(default = "default_bus_port")]
    pub bus_port: u16,

    #[serde(default)]
    pub bus_username: Option<String>,

    #[serde(default)]
    pub bus_password: Option<String>,

    /// Force messaging off even when a host is configured
    #[serde(default)]
    pub bus_disabled: bool,

    /// Fallback delay for best-effort requests in milliseconds
    #[serde(default = "default_best_effort_timeout")]
    pub best_effort_timeout_ms: u64,

    /// JSON file seeding the in-memory document stores
    #[serde(default)]
    pub documents_path: Option<PathBuf>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "app-bridge".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_bus_port() -> u16 {
    61613
}

fn default_best_effort_timeout() -> u64 {
    7000
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            bus_host: None,
            bus_port: default_bus_port(),
            bus_username: None,
            bus_password: None,
            bus_disabled: false,
            best_effort_timeout_ms: default_best_effort_timeout(),
            documents_path: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_source(config::Environment::with_prefix("BRIDGE").try_parsing(true))
    }

    fn from_source(source: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read bridge configuration")?;

        config
            .try_deserialize()
            .context("Invalid bridge configuration")
    }

    /// STOMP settings, or `None` when messaging is disabled
    pub fn stomp(&self) -> Option<StompConfig> {
        if self.bus_disabled {
            return None;
        }
        let host = self.bus_host.as_deref().filter(|h| !h.trim().is_empty())?;
        Some(StompConfig {
            host: host.to_string(),
            port: self.bus_port,
            username: self.bus_username.clone(),
            password: self.bus_password.clone(),
            ..Default::default()
        })
    }

    pub fn best_effort_timeout(&self) -> Duration {
        Duration::from_millis(self.best_effort_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix("BRIDGE")
            .try_parsing(true)
            .source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_source(env(&[])).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.bus_port, 61613);
        assert_eq!(config.best_effort_timeout(), Duration::from_secs(7));
        assert!(config.stomp().is_none());
    }

    #[test]
    fn test_bus_settings() {
        let config = BridgeConfig::from_source(env(&[
            ("BRIDGE_BUS_HOST", "activemq"),
            ("BRIDGE_BUS_PORT", "61616"),
            ("BRIDGE_BUS_USERNAME", "admin"),
            ("BRIDGE_BEST_EFFORT_TIMEOUT_MS", "250"),
        ]))
        .unwrap();

        let stomp = config.stomp().unwrap();
        assert_eq!(stomp.host, "activemq");
        assert_eq!(stomp.port, 61616);
        assert_eq!(stomp.username.as_deref(), Some("admin"));
        assert!(stomp.password.is_none());
        assert_eq!(config.best_effort_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_bus_disabled_wins() {
        let config = BridgeConfig::from_source(env(&[
            ("BRIDGE_BUS_HOST", "activemq"),
            ("BRIDGE_BUS_DISABLED", "true"),
        ]))
        .unwrap();
        assert!(config.stomp().is_none());
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        assert!(BridgeConfig::from_source(env(&[("BRIDGE_BUS_PORT", "not-a-port")])).is_err());
    }
}
