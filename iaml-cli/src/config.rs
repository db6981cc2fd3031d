//! `iaml.toml` loading.

use std::fs;
use std::path::{Path, PathBuf};

use iaml_core::gateway::GatewayConfig;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "iaml.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },
}

/// Settings read from `iaml.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub backend: Option<String>,
    pub endpoint: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backend: Option<String>,
    pub endpoint: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl CliConfig {
    pub fn parse(
        text: &str,
        path: &Path,
    ) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Reads `path`. A missing file is only an error when `required` is set,
    /// so the default `iaml.toml` may be absent.
    pub fn load(
        path: &Path,
        required: bool,
    ) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn with_overrides(
        self,
        overrides: Overrides,
    ) -> Self {
        Self {
            backend: overrides.backend.or(self.backend),
            endpoint: overrides.endpoint.or(self.endpoint),
            stripe_publishable_key: overrides
                .stripe_publishable_key
                .or(self.stripe_publishable_key),
            log_level: overrides.log_level.or(self.log_level),
            log_file: overrides.log_file.or(self.log_file),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let defaults = GatewayConfig::default();
        GatewayConfig {
            backend: self
                .backend
                .as_deref()
                .map(|b| b.trim().to_ascii_lowercase())
                .unwrap_or(defaults.backend),
            endpoint: self.endpoint.clone().unwrap_or(defaults.endpoint),
            stripe_publishable_key: self.stripe_publishable_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_full_file() {
        let text = r#"
            backend = "http"
            endpoint = "https://www.iaml.com"
            stripe_publishable_key = "pk_test_abc"
            log_level = "debug"
            log_file = "iaml.log"
        "#;

        let config = CliConfig::parse(text, Path::new("iaml.toml")).unwrap();

        assert_eq!(config.backend.as_deref(), Some("http"));
        assert_eq!(config.endpoint.as_deref(), Some("https://www.iaml.com"));
        assert_eq!(config.log_file, Some(PathBuf::from("iaml.log")));
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let result = CliConfig::parse("database = \"x\"", Path::new("iaml.toml"));

        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_default_file_is_empty() {
        let config = CliConfig::load(Path::new("/definitely/not/iaml.toml"), false).unwrap();

        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = CliConfig::load(Path::new("/definitely/not/iaml.toml"), true);

        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_flags_override_file() {
        let file = CliConfig {
            backend: Some("memory".to_string()),
            endpoint: Some("sessions.csv".to_string()),
            ..CliConfig::default()
        };

        let merged = file.with_overrides(Overrides {
            backend: Some("HTTP".to_string()),
            ..Overrides::default()
        });
        let gateway = merged.gateway_config();

        assert_eq!(gateway.backend, "http");
        assert_eq!(gateway.endpoint, "sessions.csv");
        assert_eq!(gateway.stripe_publishable_key, None);
    }

    #[test]
    fn test_gateway_config_defaults_to_memory() {
        assert_eq!(
            CliConfig::default().gateway_config(),
            GatewayConfig::default()
        );
    }
}
