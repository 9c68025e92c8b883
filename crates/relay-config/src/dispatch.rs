//! Queue and retry sections

use std::time::Duration;

use serde::Deserialize;

/// Dispatch queue sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum tasks the priority queue holds across all levels
    /// Default: 50000
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 50_000 }
    }
}

/// Retry/backoff policy for transient send failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// First-retry delay in seconds; also the jitter range
    /// Default: 0.3
    pub base_seconds: f64,

    /// Backoff ceiling in seconds
    /// Default: 60
    pub cap_seconds: f64,

    /// Attempts before a task is dropped
    /// Default: 3
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_seconds: 0.3,
            cap_seconds: 60.0,
            max_attempts: 3,
        }
    }
}

impl RetryConfig {
    pub fn base(&self) -> Duration {
        Duration::from_secs_f64(self.base_seconds)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_secs_f64(self.cap_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let q = QueueConfig::default();
        assert_eq!(q.capacity, 50_000);

        let r = RetryConfig::default();
        assert_eq!(r.max_attempts, 3);
        assert_eq!(r.base(), Duration::from_millis(300));
        assert_eq!(r.cap(), Duration::from_secs(60));
    }

    #[test]
    fn test_deserialize() {
        let r: RetryConfig = toml::from_str("base_seconds = 1.5\nmax_attempts = 5").unwrap();
        assert_eq!(r.base(), Duration::from_millis(1500));
        assert_eq!(r.max_attempts, 5);
        assert_eq!(r.cap_seconds, 60.0);
    }
}
