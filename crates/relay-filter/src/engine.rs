//! The filter engine
//!
//! `FilterEngine::apply` is the single decision point for a `(message, pair)`
//! combination: drop with a reason, or keep with rewritten text and
//! re-indexed entities. It does no I/O; global blocked words come in from the
//! caller, everything else from the pair's policy.

use once_cell::sync::Lazy;
use regex::Regex;

use relay_protocol::{Entity, MessageEvent};

use crate::entities::{apply_edits, apply_to_text};
use crate::mentions::remove_mentions;
use crate::policy::FilterPolicy;
use crate::strip::{strip_edge, Edge};
use crate::words::{blocked_term, PatternCache};

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;

/// URL shapes the link gate recognises
static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(https?://\S+|www\.\S+|t\.me/\S+)").unwrap());

/// Why a message was not copied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Matched the global word block list
    GlobalWord,
    /// Matched the pair's word block list
    PairWord,
    /// Matched one of the pair's drop patterns
    Pattern,
    /// The pair blocks forwarded messages
    Forwarded,
    /// The pair blocks messages containing links
    Link,
    /// Media kind not in the pair's allow set
    MediaType,
    /// Final text shorter than `min_length`
    TooShort,
    /// Final text longer than `max_length`
    TooLong,
    /// Image matched a blocked perceptual hash (raised by the pipeline)
    ImageBlocked,
}

impl DropReason {
    /// Stable label used in logs and per-pair counters
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GlobalWord => "global_word",
            Self::PairWord => "pair_word",
            Self::Pattern => "pattern",
            Self::Forwarded => "forwarded",
            Self::Link => "link",
            Self::MediaType => "media_type",
            Self::TooShort => "too_short",
            Self::TooLong => "too_long",
            Self::ImageBlocked => "image_blocked",
        }
    }

    /// Whether this reason counts as a word-block hit in pair stats
    pub fn is_word_block(self) -> bool {
        matches!(self, Self::GlobalWord | Self::PairWord)
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of filtering one message for one pair
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    /// Copy the message with this text and these entities
    Keep { text: String, entities: Vec<Entity> },
    /// Do not copy
    Drop(DropReason),
}

impl FilterOutcome {
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop(_))
    }
}

/// Stateless filter with a compiled-pattern cache
///
/// One engine is shared by the whole process; the cache is the only interior
/// state and is safe for concurrent use.
#[derive(Debug, Default)]
pub struct FilterEngine {
    cache: PatternCache,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter `msg` for a pair with `policy`
    ///
    /// `global_words` is the process-wide block list; it is checked before
    /// anything pair-specific so a globally blocked message costs one scan
    /// regardless of fan-out. `pair_words` carries pair-scoped terms managed
    /// outside the policy record (the store's word table); they block exactly
    /// like `policy.blocked_words`.
    pub fn apply(
        &self,
        msg: &MessageEvent,
        policy: &FilterPolicy,
        global_words: &[String],
        pair_words: &[String],
    ) -> FilterOutcome {
        // 1-2. Word blocks run against the original text.
        if let Some(term) = blocked_term(
            &msg.text,
            global_words.iter().map(String::as_str),
            &self.cache,
        ) {
            tracing::debug!(term = %term, msg = %msg.id, "dropped by global word block");
            return FilterOutcome::Drop(DropReason::GlobalWord);
        }
        let pair_terms = policy
            .blocked_words
            .iter()
            .map(String::as_str)
            .chain(pair_words.iter().map(String::as_str));
        if let Some(term) = blocked_term(&msg.text, pair_terms, &self.cache) {
            tracing::debug!(term = %term, msg = %msg.id, "dropped by pair word block");
            return FilterOutcome::Drop(DropReason::PairWord);
        }

        // 3. Custom drop patterns; an unparseable pattern is skipped, not fatal.
        for pattern in &policy.drop_patterns {
            if let Some(re) = self.cache.user_pattern(pattern) {
                if re.is_match(&msg.text) {
                    return FilterOutcome::Drop(DropReason::Pattern);
                }
            }
        }

        // 4. Forward / link gates.
        if policy.block_forwards && msg.forwarded {
            return FilterOutcome::Drop(DropReason::Forwarded);
        }
        if policy.block_links && LINK.is_match(&msg.text) {
            return FilterOutcome::Drop(DropReason::Link);
        }

        // 5. Media gate.
        if !policy.allows_media(msg.media_kind()) {
            return FilterOutcome::Drop(DropReason::MediaType);
        }

        let mut text = msg.text.clone();
        let mut entities = msg.entities.clone();

        // 6-7. Header, then footer. Each works on whole lines only.
        for (pattern, edge) in [
            (&policy.header_pattern, Edge::Leading),
            (&policy.footer_pattern, Edge::Trailing),
        ] {
            let Some(pattern) = pattern else { continue };
            let Some(re) = self.cache.user_pattern(pattern) else {
                continue;
            };
            let edits = strip_edge(&text, &re, edge);
            if !edits.is_empty() {
                let empties = vec![""; edits.len()];
                text = apply_to_text(&text, &edits, &empties);
                entities = apply_edits(&entities, &edits);
            }
        }

        // 8. Mention removal.
        if policy.remove_mentions {
            let (new_text, new_entities, _) = remove_mentions(
                &text,
                entities,
                &policy.mention_placeholder,
                &self.cache,
            );
            text = new_text;
            entities = new_entities;
        }

        // 9. Length gate on the final text.
        let len = text.chars().count();
        if policy.min_length > 0 && len < policy.min_length {
            return FilterOutcome::Drop(DropReason::TooShort);
        }
        if policy.max_length > 0 && len > policy.max_length {
            return FilterOutcome::Drop(DropReason::TooLong);
        }

        FilterOutcome::Keep { text, entities }
    }
}
