//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gateway identity and lifecycle configuration.
    pub gateway: GatewaySection,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Gateway section configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// Gateway instance name.
    pub name: String,

    /// Path to the TOML seed holding services, routes, targets, and users.
    pub seed_file: PathBuf,

    /// Seconds to wait for in-flight requests when draining a listener.
    pub drain_grace_secs: u64,
}

impl GatewaySection {
    /// Drain grace as a [`Duration`].
    #[must_use]
    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            name: "veil-gateway".to_string(),
            seed_file: PathBuf::from("gateway.seed.toml"),
            drain_grace_secs: 10,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: LogLevel,

    /// Log format (json, pretty, compact).
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level (most verbose).
    Trace,
    /// Debug level.
    Debug,
    /// Info level (default).
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level (least verbose).
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (machine-readable).
    Json,
    /// Pretty format with colors (default).
    #[default]
    Pretty,
    /// Compact single-line format.
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_gateway_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.gateway.name, "veil-gateway");
        assert_eq!(config.gateway.drain_grace_secs, 10);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
            [gateway]
            name = "test-gateway"
        "#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.name, "test-gateway");
        assert_eq!(config.gateway.seed_file, PathBuf::from("gateway.seed.toml"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [gateway]
            name = "edge-gateway"
            seed_file = "/etc/veil/seed.toml"
            drain_grace_secs = 30

            [logging]
            level = "debug"
            format = "json"
        "#;

        let config: GatewayConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.gateway.name, "edge-gateway");
        assert_eq!(config.gateway.drain_grace(), Duration::from_secs(30));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}
