//! The dispatcher
//!
//! Owns the priority queue and the worker pool. Workers pop the
//! highest-priority ready task, pick a sender, execute, and settle the
//! outcome: mapping writes on acked sends, backoff re-enqueue on retryable
//! failures, error-log entries on drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_protocol::{Priority, SendError};
use relay_store::{StatDelta, Store};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backoff::backoff_delay;
use crate::circuit::CircuitBreaker;
use crate::error::EnqueueError;
use crate::locks::ShardedLocks;
use crate::metrics::{DispatchMetrics, DispatchSnapshot};
use crate::pool::{Selection, SenderHandle, SenderPool};
use crate::queue::{PriorityQueue, PushError};
use crate::task::{DispatchTask, TaskAction};

#[cfg(test)]
#[path = "dispatcher_test.rs"]
mod tests;

/// Tuning knobs, defaults per the deployment profile
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    pub drain_timeout: Duration,
    pub lock_shards: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 50_000,
            max_attempts: 3,
            retry_base: Duration::from_millis(300),
            retry_cap: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(15),
            lock_shards: 1024,
        }
    }
}

pub struct Dispatcher {
    queue: PriorityQueue,
    pool: Arc<SenderPool>,
    store: Arc<Store>,
    config: DispatcherConfig,
    metrics: DispatchMetrics,
    circuit: CircuitBreaker,
    locks: ShardedLocks,
    accepting: AtomicBool,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, pool: Arc<SenderPool>, store: Arc<Store>) -> Arc<Self> {
        Arc::new(Self {
            queue: PriorityQueue::new(config.queue_capacity),
            locks: ShardedLocks::new(config.lock_shards),
            pool,
            store,
            config,
            metrics: DispatchMetrics::new(),
            circuit: CircuitBreaker::new(),
            accepting: AtomicBool::new(true),
        })
    }

    /// Accept a task for dispatch
    ///
    /// Under an open circuit, only High and Urgent tasks are admitted; a
    /// full queue rejects regardless of priority.
    pub fn enqueue(&self, task: DispatchTask) -> Result<(), EnqueueError> {
        if !self.accepting.load(Ordering::Relaxed) {
            return Err(EnqueueError::ShuttingDown);
        }
        if !self.circuit.admits(task.priority) {
            self.metrics.record_backpressure();
            return Err(EnqueueError::Backpressure);
        }

        match self.queue.push(task) {
            Ok(()) => {
                self.metrics.record_enqueued();
                Ok(())
            }
            Err(PushError::Full(_)) => {
                self.metrics.record_overflow();
                Err(EnqueueError::QueueFull)
            }
            Err(PushError::Closed(_)) => Err(EnqueueError::ShuttingDown),
        }
    }

    /// Run the worker pool until `cancel` fires, then drain
    ///
    /// Shutdown sequence: stop accepting, give in-flight and queued work up
    /// to `drain_timeout` to finish, then abandon what remains.
    pub async fn run(self: Arc<Self>, workers: usize, cancel: CancellationToken) {
        let worker_cancel = CancellationToken::new();
        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|worker_id| {
                let dispatcher = Arc::clone(&self);
                let cancel = worker_cancel.clone();
                tokio::spawn(async move {
                    tracing::debug!(worker_id, "dispatch worker starting");
                    while let Some(task) = dispatcher.queue.pop(&cancel).await {
                        dispatcher.execute(task).await;
                    }
                    tracing::debug!(worker_id, "dispatch worker stopping");
                })
            })
            .collect();

        tracing::info!(workers, capacity = self.queue.capacity(), "dispatcher running");

        cancel.cancelled().await;
        self.accepting.store(false, Ordering::Relaxed);
        tracing::info!(
            drain_timeout = ?self.config.drain_timeout,
            queued = self.queue.len(),
            "dispatcher draining"
        );

        let deadline = Instant::now() + self.config.drain_timeout;
        while (!self.queue.is_empty() || self.metrics.snapshot().in_flight > 0)
            && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.queue.close();
        let abandoned = self.queue.clear();
        if abandoned > 0 {
            self.metrics.record_cancelled(abandoned as u64);
            tracing::warn!(abandoned, "abandoning queued tasks at shutdown");
        }

        worker_cancel.cancel();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "dispatch worker panicked");
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            done = snapshot.done,
            retried = snapshot.retried,
            failed = snapshot.failed,
            cancelled = snapshot.cancelled,
            "dispatcher stopped"
        );
    }

    async fn execute(&self, task: DispatchTask) {
        self.metrics.task_started();
        self.execute_inner(task).await;
        self.metrics.task_finished();
    }

    async fn execute_inner(&self, task: DispatchTask) {
        // At-least-once guard: a send whose mapping already exists has been
        // delivered; re-sending would duplicate it at the destination.
        if task.action.is_send() {
            if let (Some(draft), Some(pair)) = (&task.mapping, task.pair) {
                match self.store.get_mapping(draft.source_msg, pair) {
                    Ok(Some(_)) => {
                        tracing::debug!(
                            pair = %pair,
                            source_msg = %draft.source_msg,
                            "mapping exists, skipping duplicate send"
                        );
                        self.metrics.record_done();
                        return;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "mapping pre-check failed, proceeding");
                    }
                }
            }
        }

        let handle = match self.pool.select(task.preferred_sender) {
            Selection::Picked(handle) => handle,
            Selection::RetryAfter(wait) => {
                let floor = backoff_delay(
                    task.attempts.max(1),
                    self.config.retry_base,
                    self.config.retry_cap,
                );
                self.requeue(task, wait.max(floor));
                return;
            }
            Selection::Empty => {
                tracing::warn!("no senders registered, parking task");
                let wait = backoff_delay(
                    task.attempts.max(1),
                    self.config.retry_base,
                    self.config.retry_cap,
                );
                self.requeue(task, wait);
                return;
            }
        };

        // Edits and deletes for one source message serialize here so two
        // workers cannot interleave them at the destination.
        let _guard = match (&task.action, task.pair, task.source_msg) {
            (action, Some(pair), Some(msg)) if action.is_mutation() => {
                Some(self.locks.lock(pair, msg).await)
            }
            _ => None,
        };

        let started = Instant::now();
        let result = self.perform(&handle, &task).await;
        let latency = started.elapsed();

        match result {
            Ok(()) => {
                handle.record_success(latency);
                self.circuit.record(true);
                self.metrics.record_done();
            }
            Err(SendError::RateLimited { retry_after }) => {
                handle.record_rate_limited(retry_after);
                self.circuit.record(false);
                self.metrics.record_rate_limited();
                self.retry_or_drop(task, Some(retry_after), "rate_limited");
            }
            Err(SendError::Transient(reason)) => {
                handle.record_failure(true);
                self.circuit.record(false);
                tracing::debug!(
                    sender = %handle.id,
                    attempt = task.attempts + 1,
                    reason = %reason,
                    "transient send failure"
                );
                self.retry_or_drop(task, None, "transient");
            }
            Err(SendError::Permanent { code, message }) => {
                handle.record_failure(true);
                self.circuit.record(false);
                self.metrics.record_failed();
                tracing::warn!(
                    sender = %handle.id,
                    dest_chat = %task.dest_chat,
                    code = %code,
                    message = %message,
                    action = task.action.kind(),
                    "permanent send failure, dropping task"
                );
                self.settle_failure(&task, &format!("{code}: {message}"));
            }
        }
    }

    /// Execute the platform call and the store bookkeeping behind it
    async fn perform(&self, handle: &Arc<SenderHandle>, task: &DispatchTask) -> Result<(), SendError> {
        let client = handle.client();
        match &task.action {
            TaskAction::SendText {
                text,
                entities,
                reply_to,
                disable_preview,
            } => {
                let dest_msg = client
                    .send_text(task.dest_chat, text, entities, *reply_to, *disable_preview)
                    .await?;
                self.settle_send(handle, task, dest_msg);
                Ok(())
            }
            TaskAction::SendMedia {
                kind,
                bytes,
                caption,
                entities,
                reply_to,
            } => {
                let dest_msg = client
                    .send_media(task.dest_chat, *kind, bytes, caption, entities, *reply_to)
                    .await?;
                self.settle_send(handle, task, dest_msg);
                Ok(())
            }
            TaskAction::EditText {
                dest_msg,
                text,
                entities,
            } => {
                client
                    .edit_text(task.dest_chat, *dest_msg, text, entities)
                    .await?;
                if let (Some(pair), Some(src)) = (task.pair, task.source_msg) {
                    if let Err(err) = self.store.touch_mapping(src, pair) {
                        tracing::warn!(error = %err, "failed to touch mapping after edit");
                    }
                    let delta = StatDelta {
                        edits_synced: 1,
                        ..StatDelta::default()
                    };
                    if let Err(err) = self.store.bump_pair_stats(pair, delta) {
                        tracing::warn!(error = %err, "failed to bump edit stats");
                    }
                }
                Ok(())
            }
            TaskAction::Delete { dest_msg } => {
                client.delete_message(task.dest_chat, *dest_msg).await?;
                if let Some(pair) = task.pair {
                    let delta = StatDelta {
                        deletes_synced: 1,
                        ..StatDelta::default()
                    };
                    if let Err(err) = self.store.bump_pair_stats(pair, delta) {
                        tracing::warn!(error = %err, "failed to bump delete stats");
                    }
                }
                Ok(())
            }
            TaskAction::Kick { user } => client.kick_user(task.dest_chat, *user).await,
            TaskAction::Unban { user } => client.unban_user(task.dest_chat, *user).await,
        }
    }

    /// Post-ack bookkeeping for a send: mapping row, usage, pair stats
    ///
    /// A failed mapping write cannot roll back the send (the copy already
    /// exists on the platform), so it logs and moves on.
    fn settle_send(
        &self,
        handle: &Arc<SenderHandle>,
        task: &DispatchTask,
        dest_msg: relay_protocol::MsgId,
    ) {
        let Some(pair) = task.pair else { return };

        if let Some(draft) = &task.mapping {
            let replied = draft.reply_to_dest.is_some();
            let mapping =
                draft
                    .clone()
                    .into_mapping(pair, task.dest_chat, dest_msg, handle.id);
            if let Err(err) = self.store.save_mapping(&mapping) {
                tracing::warn!(
                    pair = %pair,
                    source_msg = %mapping.source_msg,
                    dest_msg = %dest_msg,
                    error = %err,
                    "send succeeded but mapping write failed"
                );
            }

            let delta = StatDelta {
                messages_copied: 1,
                replies_preserved: u32::from(replied),
                ..StatDelta::default()
            };
            if let Err(err) = self.store.bump_pair_stats(pair, delta) {
                tracing::warn!(error = %err, "failed to bump pair stats");
            }
        }

        if let Err(err) = self.store.record_sender_use(handle.id, chrono::Utc::now()) {
            tracing::warn!(error = %err, "failed to record sender use");
        }
    }

    /// One more attempt burned; re-enqueue with backoff or drop
    fn retry_or_drop(&self, mut task: DispatchTask, delay_hint: Option<Duration>, kind: &str) {
        task.attempts += 1;
        if task.attempts >= self.config.max_attempts {
            self.metrics.record_failed();
            tracing::warn!(
                attempts = task.attempts,
                action = task.action.kind(),
                dest_chat = %task.dest_chat,
                "task dropped after exhausting attempts"
            );
            self.settle_failure(&task, &format!("retries exhausted ({kind})"));
            return;
        }

        let mut delay = backoff_delay(task.attempts, self.config.retry_base, self.config.retry_cap);
        if let Some(hint) = delay_hint {
            delay = delay.max(hint);
        }
        self.metrics.record_retried();
        self.requeue(task, delay);
    }

    fn requeue(&self, mut task: DispatchTask, delay: Duration) {
        task.earliest_send_at = Instant::now() + delay;
        match self.queue.push(task) {
            Ok(()) => {}
            Err(PushError::Full(t)) => {
                self.metrics.record_overflow();
                self.metrics.record_failed();
                tracing::warn!(action = t.action.kind(), "queue full, dropping retry");
            }
            Err(PushError::Closed(_)) => {
                self.metrics.record_cancelled(1);
            }
        }
    }

    /// Record a dropped task against its pair
    fn settle_failure(&self, task: &DispatchTask, detail: &str) {
        if let Err(err) =
            self.store
                .log_error(task.action.kind(), detail, task.pair, task.preferred_sender)
        {
            tracing::warn!(error = %err, "failed to write error log");
        }
        if let Some(pair) = task.pair {
            let delta = StatDelta {
                errors: 1,
                ..StatDelta::default()
            };
            if let Err(err) = self.store.bump_pair_stats(pair, delta) {
                tracing::warn!(error = %err, "failed to bump error stats");
            }
        }
    }

    // ---- introspection ---------------------------------------------------

    pub fn metrics(&self) -> DispatchSnapshot {
        self.metrics.snapshot()
    }

    /// Ready depth per priority lane plus delayed count
    pub fn queue_depths(&self) -> ([usize; 4], usize) {
        self.queue.depths()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_fill_ratio(&self) -> f64 {
        self.queue.fill_ratio()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Abandon everything queued (admin `clearQueue`)
    pub fn clear_queue(&self) -> usize {
        let dropped = self.queue.clear();
        self.metrics.record_cancelled(dropped as u64);
        dropped
    }

    pub fn circuit_open(&self) -> bool {
        self.circuit.is_open()
    }

    pub fn pool(&self) -> &Arc<SenderPool> {
        &self.pool
    }

    /// Admission check for Normal-priority work, used by `status()`
    pub fn accepting_normal(&self) -> bool {
        self.accepting.load(Ordering::Relaxed) && self.circuit.admits(Priority::Normal)
    }
}
