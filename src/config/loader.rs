//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::GatewayConfig;
use std::path::Path;

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn load_str(&self, content: &str) -> ConfigResult<GatewayConfig> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<GatewayConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(GatewayConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            [gateway]
            name = "test"
        "#,
            )
            .unwrap();
        assert_eq!(config.gateway.name, "test");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        std::fs::write(
            &config_path,
            r#"
            [gateway]
            name = "file-test"
            drain_grace_secs = 5
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.gateway.name, "file-test");
        assert_eq!(config.gateway.drain_grace_secs, 5);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new();
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config.gateway.name, "veil-gateway");
    }
}
