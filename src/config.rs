use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const APP_DIR_NAME: &str = "quadrant";
pub const ENV_TIMEZONE: &str = "QUADRANT_TIMEZONE";
pub const ENV_CACHE_DIR: &str = "QUADRANT_CACHE_DIR";
pub const ENV_DATABASE: &str = "QUADRANT_DB";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "QUADRANT_REMOTE_TIMEOUT_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0}")]
    Invalid(&'static str),
}

/// Bounded exponential backoff applied to every remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub remote_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// IANA timezone used to resolve "today" for streaks.
    pub timezone: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 8_000,
            retry: RetryPolicy::default(),
            timezone: None,
            cache_dir: None,
            database_path: None,
        }
    }
}

impl SyncConfig {
    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(target: "quadrant", event = "config_loaded", path = %path.display());
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tz) = lookup(ENV_TIMEZONE) {
            self.timezone = Some(tz);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(raw) = lookup(ENV_REMOTE_TIMEOUT_MS) {
            self.remote_timeout_ms =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_REMOTE_TIMEOUT_MS,
                        value: raw.clone(),
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_timeout_ms == 0 {
            return Err(ConfigError::Invalid("remote_timeout_ms must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1"));
        }
        if self.retry.max_attempts > 10 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at most 10"));
        }
        if let Some(tz) = &self.timezone {
            parse_timezone(tz)?;
        }
        Ok(())
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Configured timezone, else the system zone, else UTC.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        match &self.timezone {
            Some(name) => parse_timezone(name),
            None => Ok(system_timezone()),
        }
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("cache"))
    }

    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("quadrant.sqlite3"))
    }
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}

pub fn system_timezone() -> Tz {
    match iana_time_zone::get_timezone() {
        Ok(name) => name.parse().unwrap_or_else(|_| {
            warn!(target: "quadrant", event = "system_timezone_unknown", tz = %name);
            chrono_tz::UTC
        }),
        Err(err) => {
            warn!(target: "quadrant", event = "system_timezone_unavailable", error = %err);
            chrono_tz::UTC
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(5), Duration::from_millis(2_000));
        assert_eq!(RetryPolicy::none().delay_after(3), Duration::ZERO);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = SyncConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_TIMEZONE, "Europe/Dublin"),
            (ENV_REMOTE_TIMEOUT_MS, "2500"),
        ]);
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.timezone.as_deref(), Some("Europe/Dublin"));
        assert_eq!(config.remote_timeout(), Duration::from_millis(2_500));
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Dublin);
    }

    #[test]
    fn rejects_bad_timeout_env() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env(|key| (key == ENV_REMOTE_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn validate_rejects_zero_attempts_and_unknown_zone() {
        let mut config = SyncConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let config = SyncConfig {
            timezone: Some("Mars/Olympus".into()),
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{ "retry": { "max_attempts": 2 } }"#).unwrap();
        let config = SyncConfig::from_file(tmp.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 200);
        assert_eq!(config.remote_timeout_ms, 8_000);
    }
}
