//! The typed admin API

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use relay_dispatch::{DispatchTask, Dispatcher, TaskAction};
use relay_filter::{FilterEngine, FilterOutcome};
use relay_health::{HealthMonitor, HealthReport};
use relay_image::ImageGuard;
use relay_protocol::{ChatId, PairId, Priority, SenderId, UserId};
use relay_store::{
    BlockedImage, CleanupReport, NewPair, Pair, PairStatus, SenderBinding, SenderRecord, Store,
    StoreSummary, Subscription,
};

use crate::error::{AdminError, Result};

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

/// Builds a live platform client for a persisted sender record
///
/// Registration into the running pool needs a wire-protocol client, which
/// only the platform adapter can construct; the admin surface takes it as a
/// factory so `addSender` works at runtime, not just at boot.
pub type SenderClientFactory =
    Arc<dyn Fn(&SenderRecord) -> Arc<dyn relay_protocol::Sender> + Send + Sync>;

/// Result of `testFilter`
#[derive(Debug, Clone, PartialEq)]
pub struct TestFilterResult {
    pub kept: bool,
    pub reason: Option<String>,
    pub rewritten: Option<String>,
}

/// Result of `status()`/`stats()`
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub paused: bool,
    pub accepting_normal: bool,
    pub store: StoreSummary,
    pub dispatch: relay_dispatch::DispatchSnapshot,
    pub pipeline: relay_pipeline::PipelineSnapshot,
}

/// Result of `queue()`
#[derive(Debug, Clone, Copy)]
pub struct QueueReport {
    pub len: usize,
    pub capacity: usize,
    /// Ready depth per lane: urgent, high, normal, low
    pub depths: [usize; 4],
    pub delayed: usize,
    pub circuit_open: bool,
}

pub struct AdminApi {
    store: Arc<Store>,
    filter: Arc<FilterEngine>,
    images: Arc<ImageGuard>,
    dispatcher: Arc<Dispatcher>,
    monitor: Arc<HealthMonitor>,
    pipeline: Arc<relay_pipeline::Pipeline>,
    paused: Arc<AtomicBool>,
    sender_factory: Option<SenderClientFactory>,
    default_threshold: u32,
    retention_days: u32,
}

impl AdminApi {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        filter: Arc<FilterEngine>,
        images: Arc<ImageGuard>,
        dispatcher: Arc<Dispatcher>,
        monitor: Arc<HealthMonitor>,
        pipeline: Arc<relay_pipeline::Pipeline>,
        paused: Arc<AtomicBool>,
        sender_factory: Option<SenderClientFactory>,
        default_threshold: u32,
        retention_days: u32,
    ) -> Self {
        Self {
            store,
            filter,
            images,
            dispatcher,
            monitor,
            pipeline,
            paused,
            sender_factory,
            default_threshold,
            retention_days,
        }
    }

    // ---- pairs -----------------------------------------------------------

    pub fn add_pair(
        &self,
        source: ChatId,
        destination: ChatId,
        name: &str,
        sender: Option<SenderId>,
    ) -> Result<Pair> {
        let binding = match sender {
            Some(id) => {
                // Fail early if the sender does not exist.
                self.store.get_sender(id)?;
                SenderBinding::Fixed(id)
            }
            None => SenderBinding::Pool,
        };
        Ok(self.store.create_pair(NewPair {
            source_chat: source,
            destination_chat: destination,
            name: name.to_string(),
            binding,
            filters: Default::default(),
        })?)
    }

    pub fn delete_pair(&self, id: PairId) -> Result<()> {
        Ok(self.store.delete_pair(id)?)
    }

    pub fn list_pairs(&self) -> Result<Vec<Pair>> {
        Ok(self.store.list_pairs()?)
    }

    pub fn pair_info(&self, id: PairId) -> Result<Pair> {
        Ok(self.store.get_pair(id)?)
    }

    /// `editPair(id, field, value)`: one field at a time, textual values
    pub fn edit_pair(&self, id: PairId, field: &str, value: &str) -> Result<Pair> {
        let mut pair = self.store.get_pair(id)?;

        let bad = || AdminError::BadValue {
            field: field.to_string(),
            value: value.to_string(),
        };

        match field {
            "name" => pair.name = value.to_string(),
            "status" => {
                pair.status = match value {
                    "active" => PairStatus::Active,
                    "inactive" => PairStatus::Inactive,
                    _ => return Err(bad()),
                }
            }
            "sender" => {
                pair.binding = match value {
                    "pool" => SenderBinding::Pool,
                    raw => {
                        let sender = SenderId(raw.parse().map_err(|_| bad())?);
                        self.store.get_sender(sender)?;
                        SenderBinding::Fixed(sender)
                    }
                }
            }
            "min_length" => pair.filters.min_length = value.parse().map_err(|_| bad())?,
            "max_length" => pair.filters.max_length = value.parse().map_err(|_| bad())?,
            "sync_edits" => pair.filters.sync_edits = parse_bool(value).ok_or_else(bad)?,
            "sync_deletes" => pair.filters.sync_deletes = parse_bool(value).ok_or_else(bad)?,
            "preserve_replies" => {
                pair.filters.preserve_replies = parse_bool(value).ok_or_else(bad)?
            }
            "block_forwards" => pair.filters.block_forwards = parse_bool(value).ok_or_else(bad)?,
            "block_links" => pair.filters.block_links = parse_bool(value).ok_or_else(bad)?,
            _ => return Err(AdminError::UnknownField(field.to_string())),
        }

        self.store.update_pair(&pair)?;
        Ok(pair)
    }

    // ---- senders ---------------------------------------------------------

    pub fn add_sender(&self, name: &str, credential: &str) -> Result<SenderRecord> {
        let record = self.store.add_sender(name, credential)?;
        if let Some(factory) = &self.sender_factory {
            let client = factory(&record);
            self.dispatcher
                .pool()
                .register(record.id, record.display_handle.clone(), client);
        }
        Ok(record)
    }

    pub fn list_senders(&self, include_disabled: bool) -> Result<Vec<SenderRecord>> {
        Ok(self.store.list_senders(!include_disabled)?)
    }

    pub fn toggle_sender(&self, id: SenderId) -> Result<bool> {
        let enabled = self.store.toggle_sender(id)?;
        self.dispatcher.pool().set_enabled(id, enabled);
        Ok(enabled)
    }

    pub fn delete_sender(&self, id: SenderId) -> Result<()> {
        self.store.delete_sender(id)?;
        self.dispatcher.pool().remove(id);
        Ok(())
    }

    // ---- filters ---------------------------------------------------------

    pub fn block_word(&self, word: &str, pair: Option<PairId>) -> Result<()> {
        Ok(self.store.add_blocked_word(word, pair)?)
    }

    pub fn unblock_word(&self, word: &str, pair: Option<PairId>) -> Result<bool> {
        Ok(self.store.remove_blocked_word(word, pair)?)
    }

    pub fn list_blocked(&self, pair: Option<PairId>) -> Result<Vec<String>> {
        Ok(self.store.list_blocked_words(pair)?)
    }

    pub fn block_image(
        &self,
        bytes: &[u8],
        pair: Option<PairId>,
        note: &str,
    ) -> Result<BlockedImage> {
        Ok(self
            .images
            .block(bytes, pair, Some(self.default_threshold), note)?)
    }

    /// Block an already-computed hash (the textual `blockimage` verb)
    pub fn block_image_hash(&self, phash: u64, pair: Option<PairId>) -> Result<BlockedImage> {
        Ok(self
            .store
            .block_image(phash, pair, self.default_threshold, "")?)
    }

    pub fn unblock_image(&self, phash: u64, pair: Option<PairId>) -> Result<bool> {
        Ok(self.store.unblock_image(phash, pair)?)
    }

    pub fn list_blocked_images(&self, pair: Option<PairId>) -> Result<Vec<BlockedImage>> {
        Ok(self.store.list_blocked_images(pair)?)
    }

    pub fn set_mentions(&self, id: PairId, enabled: bool, placeholder: Option<&str>) -> Result<Pair> {
        let mut pair = self.store.get_pair(id)?;
        pair.filters.remove_mentions = enabled;
        pair.filters.mention_placeholder = placeholder.unwrap_or_default().to_string();
        self.store.update_pair(&pair)?;
        Ok(pair)
    }

    /// `None` clears the pattern
    pub fn set_header_pattern(&self, id: PairId, pattern: Option<&str>) -> Result<Pair> {
        let mut pair = self.store.get_pair(id)?;
        pair.filters.header_pattern = pattern.map(str::to_string);
        self.store.update_pair(&pair)?;
        Ok(pair)
    }

    pub fn set_footer_pattern(&self, id: PairId, pattern: Option<&str>) -> Result<Pair> {
        let mut pair = self.store.get_pair(id)?;
        pair.filters.footer_pattern = pattern.map(str::to_string);
        self.store.update_pair(&pair)?;
        Ok(pair)
    }

    pub fn set_watermark(&self, id: PairId, enabled: bool, text: Option<&str>) -> Result<Pair> {
        let mut pair = self.store.get_pair(id)?;
        pair.filters.watermark_enabled = enabled;
        if let Some(text) = text {
            pair.filters.watermark_text = text.to_string();
        }
        self.store.update_pair(&pair)?;
        Ok(pair)
    }

    /// Dry-run the filter chain for a pair against sample text
    pub fn test_filter(&self, id: PairId, text: &str) -> Result<TestFilterResult> {
        let pair = self.store.get_pair(id)?;
        let (global, pair_words) = self.store.blocked_words_for(id);

        let msg = relay_protocol::MessageEvent {
            id: relay_protocol::MsgId(0),
            chat: pair.source_chat,
            author: None,
            text: text.to_string(),
            entities: vec![],
            media: None,
            reply_to: None,
            forwarded: false,
            timestamp: Utc::now(),
        };

        Ok(
            match self.filter.apply(&msg, &pair.filters, &global, &pair_words) {
                FilterOutcome::Keep { text, .. } => TestFilterResult {
                    kept: true,
                    reason: None,
                    rewritten: Some(text),
                },
                FilterOutcome::Drop(reason) => TestFilterResult {
                    kept: false,
                    reason: Some(reason.as_str().to_string()),
                    rewritten: None,
                },
            },
        )
    }

    // ---- ops -------------------------------------------------------------

    pub fn pause(&self) -> Result<()> {
        self.paused.store(true, Ordering::Relaxed);
        self.store.set_paused(true)?;
        tracing::info!("replication paused by admin");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        self.store.set_paused(false)?;
        tracing::info!("replication resumed by admin");
        Ok(())
    }

    pub fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            paused: self.paused.load(Ordering::Relaxed),
            accepting_normal: self.dispatcher.accepting_normal(),
            store: self.store.summary(Utc::now())?,
            dispatch: self.dispatcher.metrics(),
            pipeline: self.pipeline.metrics(),
        })
    }

    pub fn health(&self) -> HealthReport {
        self.monitor.report()
    }

    pub fn queue(&self) -> QueueReport {
        let (depths, delayed) = self.dispatcher.queue_depths();
        QueueReport {
            len: self.dispatcher.queue_len(),
            capacity: self.dispatcher.queue_capacity(),
            depths,
            delayed,
            circuit_open: self.dispatcher.circuit_open(),
        }
    }

    pub fn clear_queue(&self) -> usize {
        self.dispatcher.clear_queue()
    }

    pub fn backup(&self) -> Result<std::path::PathBuf> {
        Ok(self.store.backup()?)
    }

    pub fn cleanup(&self, older_than_days: Option<u32>) -> Result<CleanupReport> {
        Ok(self
            .store
            .cleanup(older_than_days.unwrap_or(self.retention_days))?)
    }

    // ---- access ----------------------------------------------------------

    pub fn add_sub(&self, user: UserId, days: i64, added_by: UserId) -> Result<Subscription> {
        Ok(self.store.add_subscription(user, days, added_by, "")?)
    }

    pub fn renew_sub(&self, user: UserId, days: i64) -> Result<Subscription> {
        Ok(self.store.renew_subscription(user, days)?)
    }

    pub fn list_subs(&self) -> Result<Vec<Subscription>> {
        Ok(self.store.list_subscriptions()?)
    }

    /// Kick `user` from every active destination chat, at urgent priority
    ///
    /// With a `duration`, a matching unban is scheduled through the delayed
    /// queue so the user can rejoin once the timeout lapses.
    pub fn kick_all(&self, user: UserId, duration: Option<std::time::Duration>) -> Result<usize> {
        let kicked = self.for_each_destination(TaskAction::Kick { user }, user, None)?;
        if let Some(duration) = duration {
            self.for_each_destination(TaskAction::Unban { user }, user, Some(duration))?;
        }
        Ok(kicked)
    }

    pub fn unban_all(&self, user: UserId) -> Result<usize> {
        self.for_each_destination(TaskAction::Unban { user }, user, None)
    }

    fn for_each_destination(
        &self,
        action: TaskAction,
        user: UserId,
        delay: Option<std::time::Duration>,
    ) -> Result<usize> {
        let chats: std::collections::BTreeSet<ChatId> = self
            .store
            .list_pairs()?
            .into_iter()
            .filter(|p| p.is_active())
            .map(|p| p.destination_chat)
            .collect();

        let mut enqueued = 0;
        for chat in chats {
            let mut task = DispatchTask::admin(chat, action.clone(), Priority::Urgent);
            if let Some(delay) = delay {
                task.earliest_send_at = std::time::Instant::now() + delay;
            }
            self.dispatcher.enqueue(task)?;
            enqueued += 1;
        }
        tracing::info!(
            user = %user,
            chats = enqueued,
            delayed = delay.is_some(),
            "moderation tasks enqueued"
        );
        Ok(enqueued)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}
