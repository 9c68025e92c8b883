//! Cross-field configuration validation
//!
//! Checks run after parsing, before the config reaches any component. Values
//! caught here would otherwise surface as confusing runtime behavior (a
//! zero-capacity queue drops everything, a zero worker pool hangs forever).

use crate::{Config, ConfigError, Result};

pub(crate) fn validate(config: &Config) -> Result<()> {
    if config.server.max_workers == 0 {
        return Err(invalid("server.max_workers must be at least 1"));
    }
    if config.server.max_workers > 500 {
        return Err(invalid("server.max_workers must be at most 500"));
    }
    if config.server.max_concurrent_downloads == 0 {
        return Err(invalid("server.max_concurrent_downloads must be at least 1"));
    }
    if config.queue.capacity == 0 {
        return Err(invalid("queue.capacity must be at least 1"));
    }
    if config.retry.base_seconds <= 0.0 {
        return Err(invalid("retry.base_seconds must be positive"));
    }
    if config.retry.cap_seconds < config.retry.base_seconds {
        return Err(invalid("retry.cap_seconds must be >= retry.base_seconds"));
    }
    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }
    if !(1..=32).contains(&config.image.similarity_threshold) {
        return Err(invalid("image.similarity_threshold must be in 1..=32"));
    }
    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = Config::from_str("[server]\nmax_workers = 0").unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn test_cap_below_base_rejected() {
        let err =
            Config::from_str("[retry]\nbase_seconds = 5.0\ncap_seconds = 1.0").unwrap_err();
        assert!(err.to_string().contains("cap_seconds"));
    }

    #[test]
    fn test_threshold_range() {
        let err = Config::from_str("[image]\nsimilarity_threshold = 0").unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
        assert!(Config::from_str("[image]\nsimilarity_threshold = 12").is_ok());
    }
}
