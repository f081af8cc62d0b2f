//! Client configuration.
//!
//! Defaults match a locally running marketplace backend. `ClientConfig::from_env` applies
//! environment overrides; the binary loads a `.env` file into the environment first.

use std::path::PathBuf;

use thiserror::Error;

use crate::cache::CacheConfig;
use crate::error::Locale;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub const ENV_BASE_URL: &str = "RENTAL_API_URL";
pub const ENV_TIMEOUT_MS: &str = "RENTAL_API_TIMEOUT_MS";
pub const ENV_LOCALE: &str = "RENTAL_LOCALE";
pub const ENV_SESSION_FILE: &str = "RENTAL_SESSION_FILE";
pub const ENV_CACHE_TTL_SECONDS: &str = "RENTAL_CACHE_TTL_SECONDS";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, without a trailing slash.
    pub base_url: String,
    pub timeout_ms: u64,
    pub locale: Locale,
    /// Where the `userInfo` record is persisted; `None` uses the platform data dir.
    pub session_file: Option<PathBuf>,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            locale: Locale::default(),
            session_file: None,
            cache: CacheConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            let url = url.trim();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid {
                    key: ENV_BASE_URL,
                    reason: format!("'{}' is not an http(s) URL", url),
                });
            }
            config.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = parse_positive(ENV_TIMEOUT_MS, &timeout)?;
        }

        if let Some(locale) = lookup(ENV_LOCALE) {
            config.locale = locale.parse().map_err(|reason| ConfigError::Invalid {
                key: ENV_LOCALE,
                reason,
            })?;
        }

        if let Some(path) = lookup(ENV_SESSION_FILE).filter(|v| !v.trim().is_empty()) {
            config.session_file = Some(PathBuf::from(path.trim()));
        }

        if let Some(ttl) = lookup(ENV_CACHE_TTL_SECONDS) {
            config.cache.default_ttl_seconds = parse_positive(ENV_CACHE_TTL_SECONDS, &ttl)?;
        }

        Ok(config)
    }

    // Session file location, defaulting to <data dir>/rental/session.json
    pub fn session_path(&self) -> PathBuf {
        self.session_file.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("rental")
                .join("session.json")
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("'{}' is not a positive integer", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.locale, Locale::Es);
        assert!(config.session_file.is_none());
    }

    #[test]
    fn test_overrides_apply() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_BASE_URL, "https://api.example.com/v1/"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_LOCALE, "en"),
            (ENV_SESSION_FILE, "/tmp/rental-session.json"),
            (ENV_CACHE_TTL_SECONDS, "60"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.session_path(), PathBuf::from("/tmp/rental-session.json"));
        assert_eq!(config.cache.default_ttl_seconds, 60);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_TIMEOUT_MS, .. }));

        let err = ClientConfig::from_lookup(lookup(&[(ENV_BASE_URL, "localhost:5000")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_BASE_URL, .. }));

        let err = ClientConfig::from_lookup(lookup(&[(ENV_LOCALE, "fr")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: ENV_LOCALE, .. }));
    }

    #[test]
    fn test_default_session_path_ends_with_file_name() {
        let config = ClientConfig::default();
        assert!(config.session_path().ends_with("rental/session.json"));
    }
}
