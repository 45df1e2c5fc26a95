//! Engine configuration.
//!
//! Every field has a default, so an absent file or a partial document is
//! valid. The file may be JSON or YAML. Header values may reference
//! environment variables as `${env:NAME}`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dirs_next::config_dir;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use trellis_util::expand_tilde;

use crate::retry::RetryPolicy;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "TRELLIS_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("environment variable '{0}' referenced by config is not set")]
    MissingEnv(String),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Application id; names the `<appId>-sessionInfo` storage namespace.
    pub app_id: String,
    pub cache_ttl_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub socket_connect_attempts: u32,
    pub socket_reconnect_attempts: u32,
    pub socket_reconnect_delay_ms: u64,
    /// Messages retained per connection; 0 disables the log.
    pub message_log_limit: usize,
    pub max_interpolation_passes: usize,
    pub http_timeout_ms: u64,
    pub default_headers: IndexMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_id: "trellis".to_string(),
            cache_ttl_ms: 60_000,
            retry_attempts: 3,
            retry_delay_ms: 500,
            socket_connect_attempts: 3,
            socket_reconnect_attempts: 5,
            socket_reconnect_delay_ms: 1_000,
            message_log_limit: 100,
            max_interpolation_passes: 4,
            http_timeout_ms: 30_000,
            default_headers: IndexMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    /// Structural checks applied after loading.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "appId".into(),
                reason: "cannot be empty".into(),
            });
        }
        if self.max_interpolation_passes == 0 {
            return Err(ConfigError::Invalid {
                field: "maxInterpolationPasses".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "httpTimeoutMs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// Returns the default path for the engine configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return expand_tilde(&path);
    }

    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("trellis").join("engine.yaml")
}

/// Loads the configuration from the default path.
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads the configuration from a specific path; a missing file yields defaults.
pub fn load_config_from_path(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no engine config found, using defaults");
        return Ok(EngineConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let mut config = parse_config(&content).map_err(|reason| ConfigError::Parse {
        path: path.display().to_string(),
        reason,
    })?;
    interpolate_headers(&mut config.default_headers)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<EngineConfig, String> {
    if content.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    // YAML is a superset of JSON, but JSON errors are clearer for JSON input.
    if content.trim_start().starts_with('{') {
        return serde_json::from_str(content).map_err(|error| error.to_string());
    }
    serde_yaml::from_str(content).map_err(|error| error.to_string())
}

static ENV_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{env:([\w+_-]*)}").unwrap());

fn interpolate_headers(headers: &mut IndexMap<String, String>) -> Result<(), ConfigError> {
    for value in headers.values_mut() {
        *value = interpolate_string(value)?;
    }
    Ok(())
}

/// Replace `${env:NAME}` references with the variable's value.
fn interpolate_string(value: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let replaced = ENV_REFERENCE.replace_all(value, |captures: &regex::Captures| {
        let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        match env::var(name) {
            Ok(resolved) => resolved,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnv(name)),
        None => Ok(replaced.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_honors_environment_override() {
        let override_path = "~/custom/trellis/engine.yaml";
        temp_env::with_var(CONFIG_PATH_ENV, Some(override_path), || {
            assert_eq!(default_config_path(), expand_tilde(override_path));
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from_path(&temp_dir.path().join("absent.yaml")).expect("defaults");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_yaml_overrides_selected_fields() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("engine.yaml");
        fs::write(&path, "appId: shop\nretryAttempts: 5\ncacheTtlMs: 1000\n").expect("write");

        let config = load_config_from_path(&path).expect("config");
        assert_eq!(config.app_id, "shop");
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.cache_ttl(), Duration::from_secs(1));
        assert_eq!(config.max_interpolation_passes, 4);
    }

    #[test]
    fn json_documents_are_accepted() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("engine.json");
        fs::write(&path, r#"{"maxInterpolationPasses": 8}"#).expect("write");
        assert_eq!(load_config_from_path(&path).expect("config").max_interpolation_passes, 8);
    }

    #[test]
    fn header_values_interpolate_environment() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("engine.yaml");
        fs::write(&path, "defaultHeaders:\n  Authorization: \"Bearer ${env:TRELLIS_TEST_TOKEN}\"\n").expect("write");

        temp_env::with_var("TRELLIS_TEST_TOKEN", Some("abc"), || {
            let config = load_config_from_path(&path).expect("config");
            assert_eq!(config.default_headers["Authorization"], "Bearer abc");
        });
        temp_env::with_var_unset("TRELLIS_TEST_TOKEN", || {
            let error = load_config_from_path(&path).expect_err("missing env");
            assert!(matches!(error, ConfigError::MissingEnv(name) if name == "TRELLIS_TEST_TOKEN"));
        });
    }

    #[test]
    fn zero_passes_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let path = temp_dir.path().join("engine.yaml");
        fs::write(&path, "maxInterpolationPasses: 0\n").expect("write");
        assert!(matches!(load_config_from_path(&path), Err(ConfigError::Invalid { .. })));
    }
}
