//! Sender pool
//!
//! Health-aware selection over the registered sending identities. Per-sender
//! state splits by access pattern: hot counters are atomics, the EMAs and the
//! rate-limit deadline sit behind a short mutex.
//!
//! # Eligibility
//!
//! A sender is eligible iff it is enabled, not past the consecutive-failure
//! threshold, and not inside a platform rate-limit window. Selection among
//! eligible senders minimizes `in_flight`, breaking ties by highest success
//! rate, then fewest consecutive failures.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use relay_protocol::{Sender, SenderId};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;

/// EMA smoothing factor for success rate and latency
const EMA_ALPHA: f64 = 0.2;

/// Consecutive failures before a sender is quarantined
pub const F_MAX: u32 = 5;

/// Interval between probes of unhealthy senders
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// One registered sending identity with its runtime state
pub struct SenderHandle {
    pub id: SenderId,
    pub name: String,
    client: Arc<dyn Sender>,
    enabled: AtomicBool,
    unhealthy: AtomicBool,
    in_flight: AtomicU32,
    consecutive_failures: AtomicU32,
    ema: Mutex<Ema>,
}

struct Ema {
    success_rate: f64,
    avg_latency: Duration,
    rate_limited_until: Option<Instant>,
}

impl SenderHandle {
    fn new(id: SenderId, name: String, client: Arc<dyn Sender>, enabled: bool) -> Self {
        Self {
            id,
            name,
            client,
            enabled: AtomicBool::new(enabled),
            unhealthy: AtomicBool::new(false),
            in_flight: AtomicU32::new(0),
            consecutive_failures: AtomicU32::new(0),
            ema: Mutex::new(Ema {
                success_rate: 1.0,
                avg_latency: Duration::ZERO,
                rate_limited_until: None,
            }),
        }
    }

    /// The platform client behind this identity
    pub fn client(&self) -> &Arc<dyn Sender> {
        &self.client
    }

    pub fn is_eligible(&self, now: Instant) -> bool {
        self.enabled.load(Ordering::Relaxed)
            && !self.unhealthy.load(Ordering::Relaxed)
            && self
                .ema
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .rate_limited_until
                .map_or(true, |until| until <= now)
    }

    /// Remaining rate-limit wait, if any
    fn rate_limit_wait(&self, now: Instant) -> Option<Duration> {
        self.ema
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rate_limited_until
            .and_then(|until| until.checked_duration_since(now))
    }

    #[inline]
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn success_rate(&self) -> f64 {
        self.ema.lock().unwrap_or_else(|e| e.into_inner()).success_rate
    }

    fn selection_key(&self) -> (u32, f64, u32) {
        (
            self.in_flight(),
            self.success_rate(),
            self.consecutive_failures.load(Ordering::Relaxed),
        )
    }

    /// Mark one task handed to this sender
    fn task_assigned(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a completed attempt into the EMAs
    pub fn record_success(&self, latency: Duration) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let mut ema = self.ema.lock().unwrap_or_else(|e| e.into_inner());
        ema.success_rate = (1.0 - EMA_ALPHA) * ema.success_rate + EMA_ALPHA;
        let blended = (1.0 - EMA_ALPHA) * ema.avg_latency.as_secs_f64()
            + EMA_ALPHA * latency.as_secs_f64();
        ema.avg_latency = Duration::from_secs_f64(blended);
    }

    /// Record a failed attempt
    ///
    /// `counts_toward_streak` is false for rate-limit signals, which are the
    /// platform's problem, not the sender's.
    pub fn record_failure(&self, counts_toward_streak: bool) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);

        {
            let mut ema = self.ema.lock().unwrap_or_else(|e| e.into_inner());
            ema.success_rate *= 1.0 - EMA_ALPHA;
        }

        if counts_toward_streak {
            let streak = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
            if streak >= F_MAX && !self.unhealthy.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    sender = %self.id,
                    name = %self.name,
                    streak,
                    "sender marked unhealthy, awaiting probe"
                );
            }
        }
    }

    /// Honor a platform rate-limit signal
    pub fn record_rate_limited(&self, retry_after: Duration) {
        {
            let mut ema = self.ema.lock().unwrap_or_else(|e| e.into_inner());
            ema.rate_limited_until = Some(Instant::now() + retry_after);
        }
        tracing::info!(sender = %self.id, ?retry_after, "sender rate limited");
        self.record_failure(false);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn snapshot(&self, now: Instant) -> SenderSnapshot {
        let ema = self.ema.lock().unwrap_or_else(|e| e.into_inner());
        SenderSnapshot {
            id: self.id,
            name: self.name.clone(),
            enabled: self.enabled.load(Ordering::Relaxed),
            healthy: !self.unhealthy.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
            success_rate: ema.success_rate,
            avg_latency: ema.avg_latency,
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            rate_limited_for: ema
                .rate_limited_until
                .and_then(|until| until.checked_duration_since(now)),
        }
    }
}

/// Point-in-time view of one sender, for status output and alerting
#[derive(Debug, Clone)]
pub struct SenderSnapshot {
    pub id: SenderId,
    pub name: String,
    pub enabled: bool,
    pub healthy: bool,
    pub in_flight: u32,
    pub success_rate: f64,
    pub avg_latency: Duration,
    pub consecutive_failures: u32,
    pub rate_limited_for: Option<Duration>,
}

/// Result of asking the pool for a sender
pub enum Selection {
    /// Use this sender; its `in_flight` is already incremented
    Picked(Arc<SenderHandle>),
    /// Nobody is eligible right now; retry after at least this long
    RetryAfter(Duration),
    /// The pool has no senders at all
    Empty,
}

/// The set of sending identities
#[derive(Default)]
pub struct SenderPool {
    senders: RwLock<Vec<Arc<SenderHandle>>>,
}

impl SenderPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sending identity
    pub fn register(&self, id: SenderId, name: impl Into<String>, client: Arc<dyn Sender>) {
        let handle = Arc::new(SenderHandle::new(id, name.into(), client, true));
        let mut senders = self.senders.write().unwrap_or_else(|e| e.into_inner());
        senders.retain(|s| s.id != id);
        senders.push(handle);
    }

    /// Remove a sender; in-flight tasks on it complete normally
    pub fn remove(&self, id: SenderId) -> bool {
        let mut senders = self.senders.write().unwrap_or_else(|e| e.into_inner());
        let before = senders.len();
        senders.retain(|s| s.id != id);
        senders.len() != before
    }

    pub fn get(&self, id: SenderId) -> Option<Arc<SenderHandle>> {
        self.senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn set_enabled(&self, id: SenderId, enabled: bool) -> bool {
        match self.get(id) {
            Some(s) => {
                s.set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.senders.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn eligible_count(&self) -> usize {
        let now = Instant::now();
        self.senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.is_eligible(now))
            .count()
    }

    /// Pick a sender for a task
    ///
    /// A pair-bound `preferred` sender wins while eligible. Otherwise the
    /// least-loaded eligible sender wins, ties broken by success rate then
    /// failure streak. With nobody eligible, the caller re-queues after the
    /// shortest rate-limit wait the pool knows about.
    pub fn select(&self, preferred: Option<SenderId>) -> Selection {
        let now = Instant::now();
        let senders = self.senders.read().unwrap_or_else(|e| e.into_inner());

        if senders.is_empty() {
            return Selection::Empty;
        }

        if let Some(id) = preferred {
            if let Some(handle) = senders.iter().find(|s| s.id == id) {
                if handle.is_eligible(now) {
                    handle.task_assigned();
                    return Selection::Picked(handle.clone());
                }
            }
        }

        let best = senders
            .iter()
            .filter(|s| s.is_eligible(now))
            .min_by(|a, b| {
                let (fa, ra, ca) = a.selection_key();
                let (fb, rb, cb) = b.selection_key();
                fa.cmp(&fb)
                    .then(rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal))
                    .then(ca.cmp(&cb))
            });

        match best {
            Some(handle) => {
                handle.task_assigned();
                Selection::Picked(handle.clone())
            }
            None => {
                let wait = senders
                    .iter()
                    .filter_map(|s| s.rate_limit_wait(now))
                    .min()
                    .unwrap_or(PROBE_INTERVAL);
                Selection::RetryAfter(wait)
            }
        }
    }

    pub fn snapshot(&self) -> Vec<SenderSnapshot> {
        let now = Instant::now();
        self.senders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.snapshot(now))
            .collect()
    }

    /// Probe quarantined senders until cancelled
    ///
    /// Every [`PROBE_INTERVAL`], each unhealthy sender gets one `probe`
    /// round-trip; success clears its failure streak and returns it to the
    /// eligible set.
    pub async fn run_probes(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(PROBE_INTERVAL) => {}
                _ = cancel.cancelled() => return,
            }

            let quarantined: Vec<Arc<SenderHandle>> = {
                self.senders
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .iter()
                    .filter(|s| s.unhealthy.load(Ordering::Relaxed))
                    .cloned()
                    .collect()
            };

            for handle in quarantined {
                match handle.client.probe().await {
                    Ok(()) => {
                        handle.consecutive_failures.store(0, Ordering::Relaxed);
                        handle.unhealthy.store(false, Ordering::Relaxed);
                        tracing::info!(
                            sender = %handle.id,
                            name = %handle.name,
                            "sender recovered, back in rotation"
                        );
                    }
                    Err(err) => {
                        tracing::debug!(sender = %handle.id, error = %err, "probe failed");
                    }
                }
            }
        }
    }
}
