//! Configuration management for Windowgate.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, WindowError};
use crate::window::DEFAULT_PREFIX;

/// Largest limit or unit count accepted.
///
/// Store routines compare counts as double-precision numbers, which are
/// exact only up to 2^53.
pub const MAX_UNITS: u64 = 1 << 53;

/// Longest window accepted, bounded by the store's signed millisecond expiry.
pub const MAX_DURATION: Duration = Duration::from_millis(i64::MAX as u64);

/// Limit and lifetime of a fixed window.
///
/// Both values are constant for the lifetime of a limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    limit: u64,
    duration: Duration,
}

impl LimitConfig {
    /// Create a new limit configuration.
    ///
    /// The store tracks expiry in milliseconds, so windows shorter than one
    /// millisecond or longer than [`MAX_DURATION`] are rejected, as is a
    /// limit outside `1..=MAX_UNITS`.
    pub fn new(limit: u64, duration: Duration) -> Result<Self> {
        if limit == 0 {
            return Err(WindowError::InvalidLimit("limit must be positive".to_string()));
        }
        if limit > MAX_UNITS {
            return Err(WindowError::InvalidLimit(format!(
                "limit must be at most {}, got {}",
                MAX_UNITS, limit
            )));
        }
        if duration.as_millis() == 0 {
            return Err(WindowError::InvalidLimit(format!(
                "duration must be at least 1ms, got {:?}",
                duration
            )));
        }
        if duration > MAX_DURATION {
            return Err(WindowError::InvalidLimit(format!(
                "duration must be at most {}ms, got {:?}",
                MAX_DURATION.as_millis(),
                duration
            )));
        }
        Ok(Self { limit, duration })
    }

    /// Maximum units admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Lifetime of a window once opened.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Window lifetime in whole milliseconds, as sent to the store.
    pub fn duration_ms(&self) -> u64 {
        // Bounded by MAX_DURATION at construction
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Main configuration for the Windowgate tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowgateConfig {
    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Window limits
    #[serde(default)]
    pub limits: LimitSettings,
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection URL of the store
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Namespace for counter keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// Window limits as written in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    /// Units admitted per window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window lifetime in milliseconds
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            duration_ms: default_duration_ms(),
        }
    }
}

fn default_limit() -> u64 {
    100
}

fn default_duration_ms() -> u64 {
    1000
}

impl LimitSettings {
    /// Validate into a [`LimitConfig`].
    pub fn to_limit_config(&self) -> Result<LimitConfig> {
        LimitConfig::new(self.limit, Duration::from_millis(self.duration_ms))
    }
}

const ENV_PREFIX: &str = "WINDOWGATE";

impl WindowgateConfig {
    /// Load configuration, layering `WINDOWGATE__*` environment variables
    /// over an optional YAML file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_config_rejects_zero_limit() {
        let err = LimitConfig::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, WindowError::InvalidLimit(_)));
    }

    #[test]
    fn test_limit_config_rejects_sub_millisecond_window() {
        assert!(LimitConfig::new(5, Duration::ZERO).is_err());
        assert!(LimitConfig::new(5, Duration::from_micros(999)).is_err());
        assert!(LimitConfig::new(5, Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn test_limit_config_rejects_oversized_window() {
        let err = LimitConfig::new(5, Duration::from_secs(u64::MAX)).unwrap_err();
        assert!(matches!(err, WindowError::InvalidLimit(_)));
        assert!(LimitConfig::new(5, MAX_DURATION + Duration::from_millis(1)).is_err());

        let longest = LimitConfig::new(5, MAX_DURATION).unwrap();
        assert_eq!(longest.duration_ms(), i64::MAX as u64);
    }

    #[test]
    fn test_limit_config_rejects_oversized_limit() {
        assert!(LimitConfig::new(MAX_UNITS, Duration::from_secs(1)).is_ok());
        let err = LimitConfig::new(MAX_UNITS + 1, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, WindowError::InvalidLimit(_)));
    }

    #[test]
    fn test_limit_config_duration_ms() {
        let limits = LimitConfig::new(12, Duration::from_millis(250)).unwrap();
        assert_eq!(limits.limit(), 12);
        assert_eq!(limits.duration_ms(), 250);
    }

    #[test]
    fn test_defaults() {
        let config = WindowgateConfig::default();
        assert_eq!(config.store.url, "redis://127.0.0.1:6379");
        assert_eq!(config.store.key_prefix, "windowgate");
        assert_eq!(config.limits.limit, 100);
        assert_eq!(config.limits.duration_ms, 1000);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
store:
  url: redis://cache.internal:6380
  key_prefix: uploads
limits:
  limit: 12
  duration_ms: 2000
"#;
        let config = WindowgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.url, "redis://cache.internal:6380");
        assert_eq!(config.store.key_prefix, "uploads");

        let limits = config.limits.to_limit_config().unwrap();
        assert_eq!(limits.limit(), 12);
        assert_eq!(limits.duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_partial_yaml_uses_defaults() {
        let yaml = r#"
limits:
  limit: 5
"#;
        let config = WindowgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.store.key_prefix, "windowgate");
        assert_eq!(config.limits.limit, 5);
        assert_eq!(config.limits.duration_ms, 1000);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = LimitSettings {
            limit: 10,
            duration_ms: 0,
        };
        assert!(settings.to_limit_config().is_err());
    }
}
