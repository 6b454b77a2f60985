//! Configuration parsing and validation for mindful
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Store, grant, shield, approval, host and daemon sections
//! - Defaults for everything, so a missing file is not an error
//! - Validation with clear error messages

mod schema;
mod settings;
mod validation;

pub use schema::*;
pub use settings::*;
pub use validation::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("Unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration, falling back to defaults when the file does not exist
pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let path = path.as_ref();
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = parse_config("config_version = 1").unwrap();
        assert_eq!(config.grants.max_duration_minutes, 240);
    }

    #[test]
    fn parse_full_config() {
        let config = parse_config(
            r#"
            config_version = 1

            [grants]
            warning_lead_seconds = 60
            history_limit = 5

            [approval]
            endpoint = "https://approve.example/decide"
            timeout_seconds = 10

            [daemon]
            resume_interval_seconds = 15
            "#,
        )
        .unwrap();

        assert_eq!(config.grants.warning_lead, Duration::from_secs(60));
        assert_eq!(config.grants.history_limit, 5);
        assert_eq!(
            config.approval.endpoint.as_deref(),
            Some("https://approve.example/decide")
        );
        assert_eq!(config.approval.timeout, Duration::from_secs(10));
        assert_eq!(config.daemon.resume_interval, Duration::from_secs(15));
    }

    #[test]
    fn reject_wrong_version() {
        let result = parse_config("config_version = 99");
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_invalid_values() {
        let result = parse_config(
            r#"
            config_version = 1
            [daemon]
            resume_interval_seconds = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.shield.primary_label, "Request Access");
    }

    #[test]
    fn existing_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_version = 1\n[shield]\ntitle = \"Breathe\"\n",
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.shield.title, "Breathe");
    }
}
