//! The event pipeline

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relay_dispatch::{DispatchTask, Dispatcher, EnqueueError, MappingDraft, TaskAction};
use relay_filter::{DropReason, FilterEngine, FilterOutcome};
use relay_image::ImageGuard;
use relay_protocol::{
    ChatId, MessageEvent, MsgId, Priority, SourceEvent, SourceListener,
};
use relay_store::{MappingKind, Pair, StatDelta, Store};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::metrics::{PipelineMetrics, PipelineSnapshot};

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;

/// Media payload state for one event, shared across its pair fan-out
///
/// The payload downloads at most once per event no matter how many pairs
/// copy it; a failed download is remembered so the fan-out does not retry
/// per pair.
enum MediaPayload {
    NotFetched,
    Fetched(Arc<Vec<u8>>),
    Failed,
}

pub struct Pipeline {
    store: Arc<Store>,
    filter: Arc<FilterEngine>,
    images: Arc<ImageGuard>,
    dispatcher: Arc<Dispatcher>,
    listener: Arc<dyn SourceListener>,
    downloads: Arc<Semaphore>,
    paused: Arc<AtomicBool>,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(
        store: Arc<Store>,
        filter: Arc<FilterEngine>,
        images: Arc<ImageGuard>,
        dispatcher: Arc<Dispatcher>,
        listener: Arc<dyn SourceListener>,
        max_concurrent_downloads: usize,
        paused: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            filter,
            images,
            dispatcher,
            listener,
            downloads: Arc::new(Semaphore::new(max_concurrent_downloads.max(1))),
            paused,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn metrics(&self) -> PipelineSnapshot {
        self.metrics.snapshot()
    }

    /// Consume source events until the channel closes or `cancel` fires
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<SourceEvent>,
        cancel: CancellationToken,
    ) {
        tracing::info!("pipeline running");
        loop {
            let event = tokio::select! {
                event = events.recv() => event,
                _ = cancel.cancelled() => break,
            };
            let Some(event) = event else { break };
            self.handle(event).await;
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            events = snapshot.events(),
            copies = snapshot.copies_enqueued,
            filtered = snapshot.filtered,
            "pipeline stopped"
        );
    }

    /// Process one event; never propagates errors to the caller
    pub async fn handle(&self, event: SourceEvent) {
        if self.paused.load(Ordering::Relaxed) {
            tracing::trace!(kind = event.kind(), "paused, ignoring event");
            return;
        }

        match event {
            SourceEvent::New(msg) => {
                self.metrics.record_new();
                self.on_new(msg).await;
            }
            SourceEvent::Edit(msg) => {
                self.metrics.record_edit();
                self.on_edit(msg).await;
            }
            SourceEvent::Delete { chat, ids } => {
                self.metrics.record_delete();
                self.on_delete(chat, ids);
            }
        }
    }

    async fn on_new(&self, msg: MessageEvent) {
        let pairs = self.store.pairs_by_source_chat(msg.chat);
        if pairs.is_empty() {
            return;
        }

        let mut payload = MediaPayload::NotFetched;

        for pair in pairs.iter().filter(|p| p.is_active()) {
            self.copy_for_pair(&msg, pair.as_ref(), &mut payload).await;
        }
    }

    /// Filter, guard, and enqueue one copy of `msg` for `pair`
    async fn copy_for_pair(&self, msg: &MessageEvent, pair: &Pair, payload: &mut MediaPayload) {
        let (global_words, pair_words) = self.store.blocked_words_for(pair.id);

        let (text, entities) =
            match self
                .filter
                .apply(msg, &pair.filters, &global_words, &pair_words)
            {
                FilterOutcome::Keep { text, entities } => (text, entities),
                FilterOutcome::Drop(reason) => {
                    self.drop_message(pair, reason);
                    return;
                }
            };

        // Media work happens only after the filters said yes.
        let mut media_bytes = None;
        if let Some(media) = &msg.media {
            let bytes = match self.fetch_media(msg, payload).await {
                Some(bytes) => bytes,
                None => return,
            };

            if media.is_image() {
                if self.images.check(&bytes, pair.id).is_some() {
                    self.metrics.record_image_blocked();
                    self.metrics.record_filtered();
                    tracing::debug!(
                        pair = %pair.id,
                        reason = %DropReason::ImageBlocked,
                        "message filtered"
                    );
                    let mut delta = StatDelta::filtered(false);
                    delta.images_blocked = 1;
                    self.bump(pair, delta);
                    return;
                }

                if pair.filters.watermark_enabled && !pair.filters.watermark_text.is_empty() {
                    let marked = self
                        .images
                        .watermark(bytes.as_ref().clone(), &pair.filters.watermark_text);
                    media_bytes = Some(Arc::new(marked));
                } else {
                    media_bytes = Some(bytes);
                }
            } else {
                media_bytes = Some(bytes);
            }
        }

        if text.is_empty() && media_bytes.is_none() {
            tracing::debug!(pair = %pair.id, msg = %msg.id, "nothing left to send");
            return;
        }

        // Reply resolution after filtering: a dropped target simply means no
        // reply link.
        let reply_to_dest = if pair.filters.preserve_replies {
            match msg.reply_to {
                Some(parent) => self
                    .store
                    .get_mapping(parent, pair.id)
                    .unwrap_or_default()
                    .map(|m| m.dest_msg),
                None => None,
            }
        } else {
            None
        };

        let (action, kind) = match (&msg.media, media_bytes) {
            (Some(media), Some(bytes)) => {
                let kind = if text.is_empty() {
                    MappingKind::Media
                } else {
                    MappingKind::Mixed
                };
                (
                    TaskAction::SendMedia {
                        kind: media.kind,
                        bytes,
                        caption: text,
                        entities,
                        reply_to: reply_to_dest,
                    },
                    kind,
                )
            }
            _ => (
                TaskAction::SendText {
                    text,
                    entities,
                    reply_to: reply_to_dest,
                    disable_preview: false,
                },
                MappingKind::Text,
            ),
        };

        let task = DispatchTask::new(pair.id, pair.destination_chat, action, Priority::Normal)
            .with_source_msg(msg.id)
            .with_preferred_sender(pair.binding.fixed())
            .with_mapping(MappingDraft {
                source_msg: msg.id,
                source_chat: msg.chat,
                kind,
                has_media: msg.media.is_some(),
                reply_to_source: msg.reply_to,
                reply_to_dest,
            });

        self.submit(task, pair);
    }

    async fn on_edit(&self, msg: MessageEvent) {
        let pairs = self.store.pairs_by_source_chat(msg.chat);

        for pair in pairs
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| p.is_active() && p.filters.sync_edits)
        {
            let mapping = match self.store.get_mapping(msg.id, pair.id) {
                Ok(Some(mapping)) => mapping,
                Ok(None) => continue,
                Err(err) => {
                    tracing::warn!(pair = %pair.id, error = %err, "mapping lookup failed");
                    continue;
                }
            };

            // A new Drop verdict leaves the existing copy untouched.
            let (global_words, pair_words) = self.store.blocked_words_for(pair.id);
            let (text, entities) = match self
                .filter
                .apply(&msg, &pair.filters, &global_words, &pair_words)
            {
                FilterOutcome::Keep { text, entities } => (text, entities),
                FilterOutcome::Drop(_) => continue,
            };

            let task = DispatchTask::new(
                pair.id,
                mapping.dest_chat,
                TaskAction::EditText {
                    dest_msg: mapping.dest_msg,
                    text,
                    entities,
                },
                Priority::High,
            )
            .with_source_msg(msg.id)
            .with_preferred_sender(Some(mapping.sender));

            self.submit(task, pair);
        }
    }

    fn on_delete(&self, chat: ChatId, ids: Vec<MsgId>) {
        let pairs = self.store.pairs_by_source_chat(chat);

        for pair in pairs
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| p.is_active() && p.filters.sync_deletes)
        {
            for &id in &ids {
                let mapping = match self.store.get_mapping(id, pair.id) {
                    Ok(Some(mapping)) => mapping,
                    Ok(None) => continue,
                    Err(err) => {
                        tracing::warn!(pair = %pair.id, error = %err, "mapping lookup failed");
                        continue;
                    }
                };

                let task = DispatchTask::new(
                    pair.id,
                    mapping.dest_chat,
                    TaskAction::Delete {
                        dest_msg: mapping.dest_msg,
                    },
                    Priority::High,
                )
                .with_source_msg(id)
                .with_preferred_sender(Some(mapping.sender));

                self.submit(task, pair);

                // The copy is going away; the mapping goes first so a late
                // duplicate NEW cannot resolve a reply to a dead message.
                if let Err(err) = self.store.delete_mapping(id, pair.id) {
                    tracing::warn!(pair = %pair.id, source_msg = %id, error = %err,
                        "failed to delete mapping");
                }
            }
        }
    }

    /// Download the event's media once, bounded by the global semaphore
    async fn fetch_media(&self, msg: &MessageEvent, payload: &mut MediaPayload) -> Option<Arc<Vec<u8>>> {
        match payload {
            MediaPayload::Fetched(bytes) => return Some(bytes.clone()),
            MediaPayload::Failed => return None,
            MediaPayload::NotFetched => {}
        }

        let media = msg.media.as_ref()?;
        let _permit = match self.downloads.acquire().await {
            Ok(permit) => permit,
            Err(_) => return None,
        };

        match self.listener.download(&media.file).await {
            Ok(bytes) => {
                let bytes = Arc::new(bytes);
                *payload = MediaPayload::Fetched(bytes.clone());
                Some(bytes)
            }
            Err(err) => {
                self.metrics.record_download_failure();
                tracing::warn!(msg = %msg.id, error = %err, "media download failed");
                *payload = MediaPayload::Failed;
                None
            }
        }
    }

    fn drop_message(&self, pair: &Pair, reason: DropReason) {
        self.metrics.record_filtered();
        tracing::debug!(pair = %pair.id, reason = %reason, "message filtered");
        self.bump(pair, StatDelta::filtered(reason.is_word_block()));
    }

    fn submit(&self, task: DispatchTask, pair: &Pair) {
        match self.dispatcher.enqueue(task) {
            Ok(()) => self.metrics.record_enqueued(),
            Err(EnqueueError::QueueFull) => {
                self.metrics.record_overflow();
                tracing::warn!(pair = %pair.id, "queue overflow, dropping event copy");
            }
            Err(EnqueueError::Backpressure) => {
                self.metrics.record_backpressure();
                tracing::warn!(pair = %pair.id, "backpressure, dropping event copy");
            }
            Err(EnqueueError::ShuttingDown) => {
                tracing::debug!(pair = %pair.id, "dispatcher shutting down");
            }
        }
    }

    fn bump(&self, pair: &Pair, delta: StatDelta) {
        if let Err(err) = self.store.bump_pair_stats(pair.id, delta) {
            tracing::warn!(pair = %pair.id, error = %err, "failed to bump pair stats");
        }
    }
}
