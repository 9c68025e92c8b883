//! Copy-on-write in-memory indexes
//!
//! The hot path asks "which pairs listen to this source chat" for every
//! single event; that lookup must never touch SQLite or the write lock.
//! Mutations rebuild the whole map and swap it in behind an `RwLock`; readers
//! clone an `Arc` and move on.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relay_protocol::ChatId;

use crate::models::Pair;

#[derive(Default)]
pub(crate) struct PairIndex {
    by_source: RwLock<Arc<HashMap<ChatId, Arc<Vec<Arc<Pair>>>>>>,
}

impl PairIndex {
    /// Pairs whose source is `chat`; empty when none
    pub(crate) fn lookup(&self, chat: ChatId) -> Arc<Vec<Arc<Pair>>> {
        let map = self
            .by_source
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        map.get(&chat).cloned().unwrap_or_default()
    }

    /// Replace the index with a freshly loaded pair list
    pub(crate) fn rebuild(&self, pairs: Vec<Pair>) {
        let mut map: HashMap<ChatId, Vec<Arc<Pair>>> = HashMap::new();
        for pair in pairs {
            map.entry(pair.source_chat).or_default().push(Arc::new(pair));
        }

        let frozen: HashMap<ChatId, Arc<Vec<Arc<Pair>>>> = map
            .into_iter()
            .map(|(chat, pairs)| (chat, Arc::new(pairs)))
            .collect();

        *self.by_source.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(frozen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_filter::FilterPolicy;
    use relay_protocol::PairId;

    use crate::models::{PairStats, PairStatus, SenderBinding};

    fn pair(id: i64, source: i64) -> Pair {
        Pair {
            id: PairId(id),
            source_chat: ChatId(source),
            destination_chat: ChatId(source + 1000),
            name: format!("p{id}"),
            status: PairStatus::Active,
            binding: SenderBinding::Pool,
            filters: FilterPolicy::default(),
            stats: PairStats::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_lookup_groups_by_source() {
        let index = PairIndex::default();
        index.rebuild(vec![pair(1, 100), pair(2, 100), pair(3, 200)]);

        assert_eq!(index.lookup(ChatId(100)).len(), 2);
        assert_eq!(index.lookup(ChatId(200)).len(), 1);
        assert!(index.lookup(ChatId(999)).is_empty());
    }

    #[test]
    fn test_rebuild_replaces() {
        let index = PairIndex::default();
        index.rebuild(vec![pair(1, 100)]);
        let before = index.lookup(ChatId(100));

        index.rebuild(vec![pair(2, 200)]);
        assert!(index.lookup(ChatId(100)).is_empty());
        assert_eq!(index.lookup(ChatId(200)).len(), 1);

        // Old readers keep their snapshot
        assert_eq!(before.len(), 1);
    }
}
