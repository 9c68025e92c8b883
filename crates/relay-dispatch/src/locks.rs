//! Shard-striped mapping locks
//!
//! Edits and deletes for the same source message must not interleave at the
//! destination. A full lock table keyed by `(pair, source_msg)` would grow
//! without bound; striping over a fixed shard count gives the same
//! serialization with bounded memory. False sharing between unrelated keys
//! in the same shard only costs a short wait.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use relay_protocol::{MsgId, PairId};
use tokio::sync::{Mutex, MutexGuard};

pub struct ShardedLocks {
    shards: Vec<Mutex<()>>,
}

impl ShardedLocks {
    /// `shards` is rounded up to at least 1; the engine uses 1024
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1);
        Self {
            shards: (0..count).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the shard owning `(pair, msg)` for the duration of the guard
    pub async fn lock(&self, pair: PairId, msg: MsgId) -> MutexGuard<'_, ()> {
        self.shards[self.shard_for(pair, msg)].lock().await
    }

    fn shard_for(&self, pair: PairId, msg: MsgId) -> usize {
        let mut hasher = DefaultHasher::new();
        (pair.get(), msg.get()).hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

impl Default for ShardedLocks {
    fn default() -> Self {
        Self::new(1024)
    }
}
