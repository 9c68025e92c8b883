//! Subscription expiry sweeper
//!
//! Hourly pass over lapsed subscriptions: the user is removed from every
//! distinct destination chat of the active pairs, then the subscription row
//! is deleted. Removals are paced at least 200 ms apart to stay inside
//! platform limits; a partial failure keeps the row so the next pass retries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_dispatch::{Selection, SenderPool};
use relay_protocol::{ChatId, UserId};
use relay_store::Store;
use tokio_util::sync::CancellationToken;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
const CHAT_PACING: Duration = Duration::from_millis(200);

pub struct SubscriptionSweeper {
    store: Arc<Store>,
    pool: Arc<SenderPool>,
    interval: Duration,
    pacing: Duration,
}

impl SubscriptionSweeper {
    pub fn new(store: Arc<Store>, pool: Arc<SenderPool>) -> Self {
        Self {
            store,
            pool,
            interval: SWEEP_INTERVAL,
            pacing: CHAT_PACING,
        }
    }

    /// Tighter timings for tests
    #[must_use]
    pub fn with_timings(mut self, interval: Duration, pacing: Duration) -> Self {
        self.interval = interval;
        self.pacing = pacing;
        self
    }

    /// Sweep on the configured interval until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(interval = ?self.interval, "subscription sweeper running");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return,
            }
            self.sweep().await;
        }
    }

    /// One pass; public so the admin surface can force it
    pub async fn sweep(&self) {
        let expired = match self.store.expired_subscriptions(Utc::now()) {
            Ok(expired) => expired,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load expired subscriptions");
                return;
            }
        };
        if expired.is_empty() {
            return;
        }

        let chats = match self.destination_chats() {
            Ok(chats) => chats,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load destination chats");
                return;
            }
        };

        tracing::info!(
            expired = expired.len(),
            chats = chats.len(),
            "sweeping expired subscriptions"
        );

        for sub in expired {
            let all_removed = self.remove_everywhere(sub.user, &chats).await;
            if all_removed {
                match self.store.delete_subscription(sub.user) {
                    Ok(_) => tracing::info!(user = %sub.user, "expired subscription removed"),
                    Err(err) => {
                        tracing::warn!(user = %sub.user, error = %err,
                            "failed to delete subscription row");
                    }
                }
            } else {
                tracing::warn!(user = %sub.user, "partial removal, will retry next sweep");
            }
        }
    }

    /// Distinct destination chats across active pairs
    fn destination_chats(&self) -> relay_store::Result<Vec<ChatId>> {
        let chats: BTreeSet<ChatId> = self
            .store
            .list_pairs()?
            .into_iter()
            .filter(|p| p.is_active())
            .map(|p| p.destination_chat)
            .collect();
        Ok(chats.into_iter().collect())
    }

    /// Kick `user` from every chat, paced; true when every removal succeeded
    async fn remove_everywhere(&self, user: UserId, chats: &[ChatId]) -> bool {
        let mut all_ok = true;
        for (i, &chat) in chats.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pacing).await;
            }

            let handle = match self.pool.select(None) {
                Selection::Picked(handle) => handle,
                _ => {
                    tracing::warn!(user = %user, chat = %chat, "no eligible sender for removal");
                    return false;
                }
            };

            let started = std::time::Instant::now();
            match handle.client().kick_user(chat, user).await {
                Ok(()) => {
                    handle.record_success(started.elapsed());
                    tracing::debug!(user = %user, chat = %chat, "user removed");
                }
                Err(err) => {
                    handle.record_failure(true);
                    tracing::warn!(user = %user, chat = %chat, error = %err,
                        "failed to remove user");
                    all_ok = false;
                }
            }
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use relay_filter::FilterPolicy;
    use relay_protocol::{Entity, MediaKind, MsgId, SendError, Sender, SenderId};
    use relay_store::{NewPair, SenderBinding};
    use std::sync::Mutex;

    #[derive(Default)]
    struct KickRecorder {
        kicks: Mutex<Vec<(ChatId, UserId)>>,
    }

    #[async_trait]
    impl Sender for KickRecorder {
        async fn send_text(
            &self,
            _chat: ChatId,
            _text: &str,
            _entities: &[Entity],
            _reply_to: Option<MsgId>,
            _disable_preview: bool,
        ) -> Result<MsgId, SendError> {
            Ok(MsgId(1))
        }

        async fn send_media(
            &self,
            _chat: ChatId,
            _kind: MediaKind,
            _bytes: &[u8],
            _caption: &str,
            _entities: &[Entity],
            _reply_to: Option<MsgId>,
        ) -> Result<MsgId, SendError> {
            Ok(MsgId(1))
        }

        async fn edit_text(
            &self,
            _chat: ChatId,
            _msg: MsgId,
            _text: &str,
            _entities: &[Entity],
        ) -> Result<(), SendError> {
            Ok(())
        }

        async fn delete_message(&self, _chat: ChatId, _msg: MsgId) -> Result<(), SendError> {
            Ok(())
        }

        async fn kick_user(&self, chat: ChatId, user: UserId) -> Result<(), SendError> {
            self.kicks.lock().unwrap().push((chat, user));
            Ok(())
        }

        async fn unban_user(&self, _chat: ChatId, _user: UserId) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn pair(store: &Store, source: i64, dest: i64) {
        store
            .create_pair(NewPair {
                source_chat: ChatId(source),
                destination_chat: ChatId(dest),
                name: format!("p{dest}"),
                binding: SenderBinding::Pool,
                filters: FilterPolicy::default(),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweep_kicks_from_all_destinations_and_deletes_row() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        pair(&store, 100, 200);
        pair(&store, 101, 201);
        // Two pairs into the same destination: one kick only
        pair(&store, 102, 201);

        let user = UserId(5001);
        store.add_subscription(user, 0, UserId(1), "lapsed").unwrap();
        // Force expiry into the past
        let sub = store.get_subscription(user).unwrap();
        assert!(sub.is_expired(Utc::now() + ChronoDuration::seconds(1)));

        let recorder = Arc::new(KickRecorder::default());
        let pool = Arc::new(SenderPool::new());
        pool.register(SenderId(1), "k", recorder.clone());

        let sweeper = SubscriptionSweeper::new(store.clone(), pool)
            .with_timings(Duration::from_secs(3600), Duration::from_millis(1));

        // The grant has day-resolution; wait until it is actually expired
        tokio::time::sleep(Duration::from_millis(5)).await;
        sweeper.sweep().await;

        let mut kicked: Vec<i64> = recorder
            .kicks
            .lock()
            .unwrap()
            .iter()
            .map(|(chat, _)| chat.get())
            .collect();
        kicked.sort();
        assert_eq!(kicked, vec![200, 201]);

        assert!(store.list_subscriptions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_without_senders_keeps_row() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        pair(&store, 100, 200);
        store
            .add_subscription(UserId(7), 0, UserId(1), "")
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let sweeper = SubscriptionSweeper::new(store.clone(), Arc::new(SenderPool::new()))
            .with_timings(Duration::from_secs(3600), Duration::from_millis(1));
        sweeper.sweep().await;

        // Nothing could be removed, so the row survives for the next pass
        assert_eq!(store.list_subscriptions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_active_subscription_untouched() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        pair(&store, 100, 200);
        store
            .add_subscription(UserId(7), 30, UserId(1), "")
            .unwrap();

        let recorder = Arc::new(KickRecorder::default());
        let pool = Arc::new(SenderPool::new());
        pool.register(SenderId(1), "k", recorder.clone());

        let sweeper = SubscriptionSweeper::new(store.clone(), pool)
            .with_timings(Duration::from_secs(3600), Duration::from_millis(1));
        sweeper.sweep().await;

        assert!(recorder.kicks.lock().unwrap().is_empty());
        assert_eq!(store.list_subscriptions().unwrap().len(), 1);
    }
}
