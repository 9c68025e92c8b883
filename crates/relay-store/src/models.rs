//! Persisted entity types

use chrono::{DateTime, Utc};
use relay_filter::FilterPolicy;
use relay_protocol::{ChatId, MsgId, PairId, SenderId, UserId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    Active,
    Inactive,
}

impl PairStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Anything unrecognised loads as inactive so a bad row cannot start
    /// replicating by accident.
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            _ => Self::Inactive,
        }
    }
}

/// Which sending identity a pair's tasks go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderBinding {
    /// Any eligible sender, picked by load
    Pool,
    /// A specific sender; falls back to the pool when it is ineligible
    Fixed(SenderId),
}

impl SenderBinding {
    pub fn fixed(self) -> Option<SenderId> {
        match self {
            Self::Pool => None,
            Self::Fixed(id) => Some(id),
        }
    }
}

/// Per-pair counters, stored as one JSON column
///
/// These are operational statistics, not billing data; a lost increment on a
/// crashed process is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairStats {
    pub messages_copied: u64,
    pub messages_filtered: u64,
    pub words_blocked: u64,
    pub images_blocked: u64,
    pub replies_preserved: u64,
    pub edits_synced: u64,
    pub deletes_synced: u64,
    pub errors: u64,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Increment set applied to [`PairStats`] in one store round-trip
#[derive(Debug, Clone, Copy, Default)]
pub struct StatDelta {
    pub messages_copied: u32,
    pub messages_filtered: u32,
    pub words_blocked: u32,
    pub images_blocked: u32,
    pub replies_preserved: u32,
    pub edits_synced: u32,
    pub deletes_synced: u32,
    pub errors: u32,
}

impl StatDelta {
    /// Delta for one copied message
    pub fn copied() -> Self {
        Self {
            messages_copied: 1,
            ..Self::default()
        }
    }

    /// Delta for one filtered message; `word_block` routes the hit to the
    /// word counter as well.
    pub fn filtered(word_block: bool) -> Self {
        Self {
            messages_filtered: 1,
            words_blocked: u32::from(word_block),
            ..Self::default()
        }
    }

    pub fn apply_to(self, stats: &mut PairStats, now: DateTime<Utc>) {
        stats.messages_copied += u64::from(self.messages_copied);
        stats.messages_filtered += u64::from(self.messages_filtered);
        stats.words_blocked += u64::from(self.words_blocked);
        stats.images_blocked += u64::from(self.images_blocked);
        stats.replies_preserved += u64::from(self.replies_preserved);
        stats.edits_synced += u64::from(self.edits_synced);
        stats.deletes_synced += u64::from(self.deletes_synced);
        stats.errors += u64::from(self.errors);
        stats.last_activity = Some(now);
    }
}

/// A replication binding: copy everything from `source_chat` into
/// `destination_chat`, subject to `filters`
#[derive(Debug, Clone)]
pub struct Pair {
    pub id: PairId,
    pub source_chat: ChatId,
    pub destination_chat: ChatId,
    pub name: String,
    pub status: PairStatus,
    pub binding: SenderBinding,
    pub filters: FilterPolicy,
    pub stats: PairStats,
    pub created_at: DateTime<Utc>,
}

impl Pair {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == PairStatus::Active
    }
}

/// Arguments for creating a pair
#[derive(Debug, Clone)]
pub struct NewPair {
    pub source_chat: ChatId,
    pub destination_chat: ChatId,
    pub name: String,
    pub binding: SenderBinding,
    pub filters: FilterPolicy,
}

/// Content shape of a copied message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Text,
    Media,
    Mixed,
}

impl MappingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Media => "media",
            Self::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "media" => Self::Media,
            "mixed" => Self::Mixed,
            _ => Self::Text,
        }
    }
}

/// Record of one successful copy
///
/// `(source_msg, pair)` is unique: a source message maps to at most one
/// destination message per pair.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub source_msg: MsgId,
    pub dest_msg: MsgId,
    pub pair: PairId,
    pub sender: SenderId,
    pub source_chat: ChatId,
    pub dest_chat: ChatId,
    pub kind: MappingKind,
    pub has_media: bool,
    pub reply_to_source: Option<MsgId>,
    pub reply_to_dest: Option<MsgId>,
}

/// A sending identity as persisted
///
/// Runtime health metrics live in the sender pool, not here; the store only
/// keeps what must survive a restart.
#[derive(Debug, Clone)]
pub struct SenderRecord {
    pub id: SenderId,
    pub display_handle: String,
    pub credential: String,
    pub enabled: bool,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Scope of a blocked-image entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockScope {
    Global,
    Pair,
}

impl BlockScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Pair => "pair",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "global" => Self::Global,
            _ => Self::Pair,
        }
    }
}

/// A blocked perceptual hash
#[derive(Debug, Clone)]
pub struct BlockedImage {
    pub id: i64,
    pub phash: u64,
    pub scope: BlockScope,
    pub pair: Option<PairId>,
    /// Hamming radius: an image within this distance matches
    pub threshold: u32,
    pub note: String,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl BlockedImage {
    /// Whether this entry applies to `pair`
    #[inline]
    pub fn applies_to(&self, pair: PairId) -> bool {
        match self.scope {
            BlockScope::Global => true,
            BlockScope::Pair => self.pair == Some(pair),
        }
    }
}

/// Timed access grant for a destination-chat member
#[derive(Debug, Clone)]
pub struct Subscription {
    pub user: UserId,
    pub expires_at: DateTime<Utc>,
    pub added_by: UserId,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_conservative() {
        assert_eq!(PairStatus::parse("active"), PairStatus::Active);
        assert_eq!(PairStatus::parse("inactive"), PairStatus::Inactive);
        assert_eq!(PairStatus::parse("garbage"), PairStatus::Inactive);
    }

    #[test]
    fn test_stat_delta_application() {
        let mut stats = PairStats::default();
        let now = Utc::now();

        StatDelta::copied().apply_to(&mut stats, now);
        StatDelta::filtered(true).apply_to(&mut stats, now);
        StatDelta::filtered(false).apply_to(&mut stats, now);

        assert_eq!(stats.messages_copied, 1);
        assert_eq!(stats.messages_filtered, 2);
        assert_eq!(stats.words_blocked, 1);
        assert_eq!(stats.last_activity, Some(now));
    }

    #[test]
    fn test_blocked_image_scoping() {
        let entry = BlockedImage {
            id: 1,
            phash: 0xDEAD,
            scope: BlockScope::Pair,
            pair: Some(PairId(3)),
            threshold: 5,
            note: String::new(),
            usage_count: 0,
            created_at: Utc::now(),
        };
        assert!(entry.applies_to(PairId(3)));
        assert!(!entry.applies_to(PairId(4)));

        let global = BlockedImage {
            scope: BlockScope::Global,
            pair: None,
            ..entry
        };
        assert!(global.applies_to(PairId(9)));
    }

    #[test]
    fn test_stats_json_round_trip() {
        let mut stats = PairStats::default();
        stats.messages_copied = 10;
        let json = serde_json::to_string(&stats).unwrap();
        let back: PairStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);

        // Legacy empty record loads as defaults
        let empty: PairStats = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, PairStats::default());
    }
}
