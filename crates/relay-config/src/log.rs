//! Logging section

use serde::Deserialize;

/// Logging configuration
///
/// The binary feeds `level` into an `EnvFilter`; `RUST_LOG` still wins when
/// set, so operators can raise verbosity without editing the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive
    /// Default: "info"
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    /// Default: false
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = LogConfig::default();
        assert_eq!(c.level, "info");
        assert!(!c.json);
    }
}
