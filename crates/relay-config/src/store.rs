//! Store section

use serde::Deserialize;

/// Database location and maintenance
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path
    /// Default: "relay.db"
    pub path: String,

    /// Days of history kept by the cleanup operation
    /// Default: 30
    pub retention_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "relay.db".into(),
            retention_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = StoreConfig::default();
        assert_eq!(c.path, "relay.db");
        assert_eq!(c.retention_days, 30);
    }
}
