//! Effective configuration with provenance
//!
//! The merged settings together with the layers that produced them. File
//! layers are recorded with their path and the SHA-256 of their bytes.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use channel_repository::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use url::Url;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Schema version of the serialized effective config
pub const SCHEMA_VERSION: u32 = 1;

/// Upper bound for `retry.max_retries`
const MAX_RETRIES_LIMIT: u64 = 100;

/// Upper bound for `retry.timeout_ms` (10 minutes)
const RETRY_TIMEOUT_LIMIT_MS: u64 = 600_000;

/// Where a layer came from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    User,
    Cli,
}

/// A layer that contributed to the effective config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub config: Value,
    /// Layers in precedence order, lowest first
    pub sources: Vec<ConfigSource>,
    /// Key paths whose values were replaced by `[REDACTED]`
    pub redactions: Vec<String>,
}

/// Keys whose values must not be printed
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "credential", "private_key"];

/// `~/.config/channels/config.toml`
pub fn default_user_config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("channels")
            .join("config.toml")
    })
}

impl EffectiveConfig {
    /// Merge the built-in defaults, the user config file (when it exists)
    /// and CLI overrides
    pub fn build(user_config: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = user_config {
            if path.exists() {
                let (value, digest) = Self::load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin: ConfigOrigin::User,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let mut config = merge_layers(layers);
        Self::validate(&config)?;
        let mut redactions = Vec::new();
        Self::redact(&mut config, String::new(), &mut redactions);

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            created_at: Utc::now(),
            config,
            sources,
            redactions,
        })
    }

    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::Parse(format!("{}: invalid UTF-8: {}", path.display(), e)))?;
        let table: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
        Ok((Self::toml_to_json(table), digest))
    }

    fn toml_to_json(value: toml::Value) -> Value {
        match value {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(items) => {
                Value::Array(items.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn redact(value: &mut Value, path: String, redactions: &mut Vec<String>) {
        let Value::Object(map) = value else {
            return;
        };
        for (key, entry) in map.iter_mut() {
            let entry_path = if path.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", path, key)
            };
            let lower = key.to_lowercase();
            if SECRET_KEYS.iter().any(|s| lower.contains(s)) && !entry.is_object() {
                *entry = Value::String("[REDACTED]".to_string());
                redactions.push(entry_path);
            } else {
                Self::redact(entry, entry_path, redactions);
            }
        }
    }

    fn validate(config: &Value) -> Result<(), ConfigError> {
        let retry = config.get("retry");
        if let Some(value) = retry.and_then(|r| r.get("max_retries")) {
            match value.as_u64() {
                Some(n) if n <= MAX_RETRIES_LIMIT => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "retry.max_retries must be an integer in [0, {}]",
                        MAX_RETRIES_LIMIT
                    )))
                }
            }
        }
        if let Some(value) = retry.and_then(|r| r.get("timeout_ms")) {
            match value.as_u64() {
                Some(ms) if ms <= RETRY_TIMEOUT_LIMIT_MS => {}
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "retry.timeout_ms must be an integer in [0, {}]",
                        RETRY_TIMEOUT_LIMIT_MS
                    )))
                }
            }
        }
        if let Some(servers) = config.get("signature").and_then(|s| s.get("keyservers")) {
            let servers = servers.as_array().ok_or_else(|| {
                ConfigError::Validation("signature.keyservers must be a list of URLs".to_string())
            })?;
            for server in servers {
                let text = server.as_str().unwrap_or_default();
                Url::parse(text).map_err(|e| {
                    ConfigError::Validation(format!("invalid keyserver URL '{}': {}", text, e))
                })?;
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Value at a dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.config, |current, part| current.get(part))
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(Value::as_u64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let max_retries = self
            .get_u64("retry.max_retries")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(defaults.max_retries);
        let timeout = self
            .get_u64("retry.timeout_ms")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        RetryPolicy {
            max_retries,
            timeout,
        }
    }

    pub fn offline(&self) -> bool {
        self.get_bool("repository.offline").unwrap_or(false)
    }

    /// Keyservers to query; none when offline
    pub fn keyservers(&self) -> Vec<Url> {
        if self.offline() {
            return Vec::new();
        }
        self.get("signature.keyservers")
            .and_then(Value::as_array)
            .map(|servers| {
                servers
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|s| Url::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn trust_store(&self) -> Option<PathBuf> {
        self.get_str("signature.trust_store").map(PathBuf::from)
    }

    pub fn local_cache(&self) -> Option<PathBuf> {
        self.get_str("repository.local_cache").map(PathBuf::from)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("validation error: {0}")]
    Validation(String),
}
