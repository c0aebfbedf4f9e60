// Locker configuration from environment variables and TOML files

use crate::error::ConfigError;
use crate::lock::{DEFAULT_BASE_PATH, TimeoutPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Prefix for locker environment variables
pub const ENV_PREFIX: &str = "SEQUENT_LOCK";

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Locker settings
///
/// ```toml
/// base_path = "/locks/billing"
/// timeout_ms = 5000
/// on_timeout = "release"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockerConfig {
    /// Domain path requests are registered under
    pub base_path: String,
    /// Wait bound in milliseconds; 0 waits indefinitely
    pub timeout_ms: u64,
    /// What to do with the request node when waiting fails
    pub on_timeout: TimeoutPolicy,
}

impl Default for LockerConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            timeout_ms: 0,
            on_timeout: TimeoutPolicy::default(),
        }
    }
}

impl LockerConfig {
    /// Load from `SEQUENT_LOCK_BASE_PATH`, `SEQUENT_LOCK_TIMEOUT_MS` and
    /// `SEQUENT_LOCK_ON_TIMEOUT`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{ENV_PREFIX}_{name}");
            lookup(&key).map(|value| (key, value))
        };

        let mut config = Self::default();

        if let Some((_, value)) = var("BASE_PATH") {
            config.base_path = value;
        }

        if let Some((key, value)) = var("TIMEOUT_MS") {
            config.timeout_ms = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value })?;
        }

        if let Some((key, value)) = var("ON_TIMEOUT") {
            config.on_timeout = value
                .parse()
                .map_err(|_| ConfigError::Env { key, value })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Load(format!("Failed to read file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Reject settings the locker cannot use
    pub fn validate(&self) -> Result<()> {
        if !self.base_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_path must be absolute: {:?}",
                self.base_path
            )));
        }

        Ok(())
    }

    /// Wait bound as a duration
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LockerConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, LockerConfig::default());
        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
        assert_eq!(config.timeout(), None);
    }

    #[test]
    fn test_from_lookup() {
        let config = LockerConfig::from_lookup(lookup(&[
            ("SEQUENT_LOCK_BASE_PATH", "/locks/billing"),
            ("SEQUENT_LOCK_TIMEOUT_MS", "2500"),
            ("SEQUENT_LOCK_ON_TIMEOUT", "release"),
        ]))
        .unwrap();

        assert_eq!(config.base_path, "/locks/billing");
        assert_eq!(config.timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.on_timeout, TimeoutPolicy::Release);
    }

    #[test]
    fn test_bad_env_value() {
        let err =
            LockerConfig::from_lookup(lookup(&[("SEQUENT_LOCK_TIMEOUT_MS", "soon")])).unwrap_err();

        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "SEQUENT_LOCK_TIMEOUT_MS"));
    }

    #[test]
    fn test_from_env_without_vars() {
        // Only meaningful when the variables are unset in the test environment
        if std::env::var("SEQUENT_LOCK_BASE_PATH").is_err()
            && std::env::var("SEQUENT_LOCK_TIMEOUT_MS").is_err()
            && std::env::var("SEQUENT_LOCK_ON_TIMEOUT").is_err()
        {
            assert_eq!(LockerConfig::from_env().unwrap(), LockerConfig::default());
        }
    }

    #[test]
    fn test_from_toml_str() {
        let config = LockerConfig::from_toml_str(
            r#"
            base_path = "/locks"
            timeout_ms = 100
            on_timeout = "leave_registered"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_path, "/locks");
        assert_eq!(config.timeout(), Some(Duration::from_millis(100)));
        assert_eq!(config.on_timeout, TimeoutPolicy::LeaveRegistered);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = LockerConfig::from_toml_str("timeout_ms = 10").unwrap();

        assert_eq!(config.base_path, DEFAULT_BASE_PATH);
        assert_eq!(config.on_timeout, TimeoutPolicy::LeaveRegistered);
    }

    #[test]
    fn test_relative_base_path_rejected() {
        let err = LockerConfig::from_toml_str(r#"base_path = "locks""#).unwrap_err();

        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_toml() {
        let err = LockerConfig::from_toml_str("timeout_ms = \"x\"").unwrap_err();

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_path = \"/from/file\"").unwrap();

        let config = LockerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.base_path, "/from/file");

        let err = LockerConfig::from_file("/nonexistent/sequent.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }
}
