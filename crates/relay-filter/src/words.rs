//! Word-boundary block lists and the shared pattern cache
//!
//! Blocked terms match as whole words, case-insensitively, against the
//! original text: blocking `cat` must not block `category`. User-supplied
//! patterns (drop patterns, header/footer) compile once and are cached; a
//! pattern that fails to compile is remembered as dead so the warning fires
//! once, not per message.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;

/// Cache of compiled patterns, user regexes and blocked terms separately
///
/// `None` marks a pattern that failed to compile and stays disabled.
#[derive(Debug, Default)]
pub(crate) struct PatternCache {
    user: Mutex<HashMap<String, Option<Regex>>>,
    words: Mutex<HashMap<String, Option<Regex>>>,
}

impl PatternCache {
    /// Compile `pattern` case-insensitively, caching the result
    pub(crate) fn user_pattern(&self, pattern: &str) -> Option<Regex> {
        let mut cache = self.user.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(pattern.to_string())
            .or_insert_with(|| match Regex::new(&format!("(?i){pattern}")) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern, error = %err, "disabling unparseable filter pattern");
                    None
                }
            })
            .clone()
    }

    /// Compile a blocked term as a whole-word, case-insensitive matcher
    pub(crate) fn word_pattern(&self, word: &str) -> Option<Regex> {
        let mut cache = self.words.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .entry(word.to_string())
            .or_insert_with(|| {
                let escaped = regex::escape(word);
                // Escaped terms cannot fail to compile; the Option keeps the
                // cache shape uniform with user patterns.
                Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
            })
            .clone()
    }
}

/// First blocked term found in `text`, if any
pub(crate) fn blocked_term<'a, I>(text: &str, words: I, cache: &PatternCache) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    for word in words {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        if let Some(re) = cache.word_pattern(word) {
            if re.is_match(text) {
                return Some(word.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_boundary_matching() {
        let cache = PatternCache::default();

        assert!(blocked_term("buy spam now", ["spam"], &cache).is_some());
        assert!(blocked_term("SPAM!", ["spam"], &cache).is_some());
        // Substrings do not trigger
        assert!(blocked_term("spammer alert", ["spam"], &cache).is_none());
        assert!(blocked_term("category", ["cat"], &cache).is_none());
        // Non-alphanumeric flanks count as boundaries
        assert!(blocked_term("(cat)", ["cat"], &cache).is_some());
    }

    #[test]
    fn test_multi_word_terms() {
        let cache = PatternCache::default();
        assert!(blocked_term("please click here now", ["click here"], &cache).is_some());
        assert!(blocked_term("clicked here", ["click here"], &cache).is_none());
    }

    #[test]
    fn test_regex_metacharacters_escaped() {
        let cache = PatternCache::default();
        // The dot is literal, not "any character"
        assert!(blocked_term("download v1.0 now", ["v1.0"], &cache).is_some());
        assert!(blocked_term("download v1a0 now", ["v1.0"], &cache).is_none());
    }

    #[test]
    fn test_bad_user_pattern_disabled_once() {
        let cache = PatternCache::default();
        assert!(cache.user_pattern("[unclosed").is_none());
        // Second lookup hits the cached tombstone
        assert!(cache.user_pattern("[unclosed").is_none());
        assert!(cache.user_pattern(r"^AD\b").is_some());
    }

    #[test]
    fn test_empty_words_skipped() {
        let cache = PatternCache::default();
        assert!(blocked_term("anything", ["", "  "], &cache).is_none());
    }
}
