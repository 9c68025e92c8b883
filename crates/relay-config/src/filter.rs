//! Filter and image sections

use serde::Deserialize;

/// Global filter seeds
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Words blocked across every pair, loaded into the store at startup
    pub global_blocked_words: Vec<String>,
}

/// Image blocking defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Default Hamming radius for new blocked-image entries
    /// Default: 5
    pub similarity_threshold: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert!(FilterConfig::default().global_blocked_words.is_empty());
        assert_eq!(ImageConfig::default().similarity_threshold, 5);
    }

    #[test]
    fn test_deserialize_words() {
        let c: FilterConfig =
            toml::from_str(r#"global_blocked_words = ["spam", "promo"]"#).unwrap();
        assert_eq!(c.global_blocked_words, vec!["spam", "promo"]);
    }
}
