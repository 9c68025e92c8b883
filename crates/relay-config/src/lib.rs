//! Relay Configuration
//!
//! TOML-based configuration with sensible defaults. A missing file or an
//! empty one yields a fully working configuration; only deviations need to be
//! written down.
//!
//! # Parsing
//!
//! ```
//! use relay_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[queue]\ncapacity = 10000").unwrap();
//! assert_eq!(config.queue.capacity, 10000);
//! ```
//!
//! # Environment overrides
//!
//! A handful of operational knobs can be overridden without touching the
//! file (deployment images set these): `MAX_WORKERS`, `QUEUE_CAPACITY`,
//! `MAX_CONCURRENT_DOWNLOADS`, `RETRY_BASE_SECONDS`, `RETRY_CAP_SECONDS`,
//! `MAX_ATTEMPTS`, `SIMILARITY_THRESHOLD`, `GLOBAL_BLOCKED_WORDS`,
//! `ADMIN_USERS`. Apply them with [`Config::apply_env`].

mod dispatch;
mod error;
mod filter;
mod log;
mod server;
mod store;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use dispatch::{QueueConfig, RetryConfig};
pub use error::{ConfigError, Result};
pub use filter::{FilterConfig, ImageConfig};
pub use log::LogConfig;
pub use server::{AdminConfig, HttpConfig, ServerConfig};
pub use store::StoreConfig;

/// Top-level configuration
///
/// Every section is optional and defaults apply per-field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker counts, drain timeout, download concurrency
    pub server: ServerConfig,

    /// Dispatch queue sizing
    pub queue: QueueConfig,

    /// Retry/backoff policy
    pub retry: RetryConfig,

    /// Global filter seeds
    pub filter: FilterConfig,

    /// Image blocking defaults
    pub image: ImageConfig,

    /// Database location and maintenance
    pub store: StoreConfig,

    /// Logging
    pub log: LogConfig,

    /// Admin surface access control
    pub admin: AdminConfig,

    /// Optional status endpoint
    pub http: HttpConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    /// Overlay recognised environment variables onto this configuration
    ///
    /// Unparseable values are ignored with a warning so a bad deployment
    /// variable cannot take the process down.
    pub fn apply_env(mut self) -> Self {
        fn parse<T: FromStr>(key: &str) -> Option<T> {
            let raw = std::env::var(key).ok()?;
            match raw.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "ignoring unparseable environment override");
                    None
                }
            }
        }

        if let Some(v) = parse("MAX_WORKERS") {
            self.server.max_workers = v;
        }
        if let Some(v) = parse("MAX_CONCURRENT_DOWNLOADS") {
            self.server.max_concurrent_downloads = v;
        }
        if let Some(v) = parse("QUEUE_CAPACITY") {
            self.queue.capacity = v;
        }
        if let Some(v) = parse("RETRY_BASE_SECONDS") {
            self.retry.base_seconds = v;
        }
        if let Some(v) = parse("RETRY_CAP_SECONDS") {
            self.retry.cap_seconds = v;
        }
        if let Some(v) = parse("MAX_ATTEMPTS") {
            self.retry.max_attempts = v;
        }
        if let Some(v) = parse("SIMILARITY_THRESHOLD") {
            self.image.similarity_threshold = v;
        }
        if let Ok(words) = std::env::var("GLOBAL_BLOCKED_WORDS") {
            self.filter.global_blocked_words = split_csv(&words);
        }
        if let Ok(ids) = std::env::var("ADMIN_USERS") {
            self.admin.users = split_csv(&ids)
                .iter()
                .filter_map(|s| s.parse().ok())
                .collect();
        }

        self
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::Parse)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Split a comma-separated list, trimming whitespace and dropping empties
fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.server.max_workers, 50);
        assert_eq!(config.queue.capacity, 50_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.image.similarity_threshold, 5);
    }

    #[test]
    fn test_partial_section() {
        let config = Config::from_str("[server]\nmax_workers = 8").unwrap();
        assert_eq!(config.server.max_workers, 8);
        // Untouched sections keep defaults
        assert_eq!(config.server.max_concurrent_downloads, 25);
        assert_eq!(config.queue.capacity, 50_000);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::from_str("queue = [[").is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/relay.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/relay.toml"));
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(split_csv("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(split_csv("").is_empty());
    }
}
