//! Typed per-pair filter policy
//!
//! The policy travels with its pair as one JSON column in the store. Legacy
//! records may carry keys this version no longer knows; those are ignored
//! with a warning rather than failing the pair.

use std::collections::BTreeSet;

use relay_protocol::MediaKind;
use serde::{Deserialize, Serialize};

/// Filter policy carried by every pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPolicy {
    /// Terms blocked for this pair, matched on word boundaries
    pub blocked_words: BTreeSet<String>,

    /// Regexes that drop the message on any match
    pub drop_patterns: Vec<String>,

    /// Strip `@handle` tokens from the text
    pub remove_mentions: bool,

    /// Replacement for removed mentions; empty means pure removal
    pub mention_placeholder: String,

    /// Anchored pattern removing matching leading lines
    pub header_pattern: Option<String>,

    /// Anchored pattern removing matching trailing lines
    pub footer_pattern: Option<String>,

    /// Minimum text length after transforms (0 = no bound)
    pub min_length: usize,

    /// Maximum text length after transforms (0 = no bound)
    pub max_length: usize,

    /// Media kinds this pair copies
    pub allowed_media_types: BTreeSet<MediaKind>,

    /// Drop messages the platform marked as forwarded
    pub block_forwards: bool,

    /// Drop messages containing links
    pub block_links: bool,

    /// Propagate source edits to the copy
    pub sync_edits: bool,

    /// Propagate source deletions to the copy
    pub sync_deletes: bool,

    /// Link copies of replies to the copy of the replied-to message
    pub preserve_replies: bool,

    /// Render `watermark_text` onto outgoing images
    pub watermark_enabled: bool,

    pub watermark_text: String,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            blocked_words: BTreeSet::new(),
            drop_patterns: Vec::new(),
            remove_mentions: false,
            mention_placeholder: String::new(),
            header_pattern: None,
            footer_pattern: None,
            min_length: 0,
            max_length: 0,
            allowed_media_types: default_media_types(),
            block_forwards: false,
            block_links: false,
            sync_edits: true,
            sync_deletes: false,
            preserve_replies: true,
            watermark_enabled: false,
            watermark_text: String::new(),
        }
    }
}

fn default_media_types() -> BTreeSet<MediaKind> {
    [
        MediaKind::Text,
        MediaKind::Photo,
        MediaKind::Video,
        MediaKind::Document,
        MediaKind::Audio,
        MediaKind::Voice,
        MediaKind::Webpage,
    ]
    .into_iter()
    .collect()
}

/// Keys this version understands, for the legacy-record warning
const KNOWN_KEYS: &[&str] = &[
    "blocked_words",
    "drop_patterns",
    "remove_mentions",
    "mention_placeholder",
    "header_pattern",
    "footer_pattern",
    "min_length",
    "max_length",
    "allowed_media_types",
    "block_forwards",
    "block_links",
    "sync_edits",
    "sync_deletes",
    "preserve_replies",
    "watermark_enabled",
    "watermark_text",
];

impl FilterPolicy {
    /// Parse a stored policy record
    ///
    /// Unknown keys are logged and dropped so records written by older or
    /// newer versions keep loading.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        if let Some(map) = value.as_object() {
            for key in map.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "ignoring unknown filter policy key");
                }
            }
        }
        serde_json::from_value(value)
    }

    /// Serialize for storage
    pub fn to_json(&self) -> String {
        // A struct of scalars and string sets cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Whether `kind` passes this pair's media gate
    #[inline]
    pub fn allows_media(&self, kind: MediaKind) -> bool {
        self.allowed_media_types.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let p = FilterPolicy::default();
        assert!(p.sync_edits);
        assert!(!p.sync_deletes);
        assert!(p.preserve_replies);
        assert!(p.allows_media(MediaKind::Text));
        assert!(p.allows_media(MediaKind::Photo));
        assert!(!p.allows_media(MediaKind::Sticker));
        assert!(!p.allows_media(MediaKind::Unknown));
    }

    #[test]
    fn test_json_round_trip() {
        let mut p = FilterPolicy::default();
        p.blocked_words.insert("spam".into());
        p.header_pattern = Some(r"^AD\b.*$".into());
        p.min_length = 3;

        let json = p.to_json();
        let back = FilterPolicy::from_json(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let raw = r#"{"blocked_words": ["x"], "custom_regex_filters": [], "topic_id": 7}"#;
        let p = FilterPolicy::from_json(raw).unwrap();
        assert!(p.blocked_words.contains("x"));
    }

    #[test]
    fn test_empty_record_is_default() {
        let p = FilterPolicy::from_json("{}").unwrap();
        assert_eq!(p, FilterPolicy::default());
    }
}
