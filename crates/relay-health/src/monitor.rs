//! Rolling health monitor

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use relay_dispatch::{DispatchSnapshot, Dispatcher, SenderSnapshot};
use relay_pipeline::Pipeline;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// EMA smoothing for the error rate
const ERROR_ALPHA: f64 = 0.2;

/// How long a threshold must hold before it alerts
const SUSTAIN: Duration = Duration::from_secs(60);

const ELEVATED_RATIO: f64 = 0.25;
const CRITICAL_RATIO: f64 = 0.50;
const QUEUE_RATIO: f64 = 0.80;

/// Most recent alerts kept for the admin view
const ALERT_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Elevated,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Point-in-time health view
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Messages per second over the last interval
    pub throughput: f64,
    pub error_rate_ema: f64,
    pub queue_len: usize,
    pub queue_capacity: usize,
    pub queue_depths: [usize; 4],
    pub eligible_senders: usize,
    pub senders: Vec<SenderSnapshot>,
    pub circuit_open: bool,
    pub recent_alerts: Vec<Alert>,
}

struct MonitorState {
    last_dispatch: DispatchSnapshot,
    last_events: u64,
    last_tick: Instant,
    error_ema: f64,
    throughput: f64,
    elevated_since: Option<Instant>,
    critical_since: Option<Instant>,
    queue_alerted: bool,
    senders_alerted: bool,
    alerts: Vec<Alert>,
}

pub struct HealthMonitor {
    dispatcher: Arc<Dispatcher>,
    pipeline: Arc<Pipeline>,
    interval: Duration,
    state: Mutex<MonitorState>,
}

impl HealthMonitor {
    pub fn new(dispatcher: Arc<Dispatcher>, pipeline: Arc<Pipeline>, interval: Duration) -> Self {
        Self {
            dispatcher,
            pipeline,
            interval,
            state: Mutex::new(MonitorState {
                last_dispatch: DispatchSnapshot::default(),
                last_events: 0,
                last_tick: Instant::now(),
                error_ema: 0.0,
                throughput: 0.0,
                elevated_since: None,
                critical_since: None,
                queue_alerted: false,
                senders_alerted: false,
                alerts: Vec::new(),
            }),
        }
    }

    /// Collect metrics until cancelled
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(interval = ?self.interval, "health monitor running");
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = cancel.cancelled() => return,
            }
            self.tick(Instant::now());
        }
    }

    /// One measurement pass; split out for tests
    pub fn tick(&self, now: Instant) {
        let dispatch = self.dispatcher.metrics();
        let events = self.pipeline.metrics().events();
        let eligible = self.dispatcher.pool().eligible_count();
        let fill = self.dispatcher.queue_fill_ratio();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // Throughput over the last window
        let elapsed = now.duration_since(state.last_tick).as_secs_f64();
        if elapsed > 0.0 {
            let delta = events.saturating_sub(state.last_events);
            state.throughput = delta as f64 / elapsed;
        }

        // Error-rate EMA from the window's terminal outcomes
        let done = dispatch.done.saturating_sub(state.last_dispatch.done);
        let failed = dispatch.failed.saturating_sub(state.last_dispatch.failed);
        let total = done + failed;
        if total > 0 {
            let window_rate = failed as f64 / total as f64;
            state.error_ema = (1.0 - ERROR_ALPHA) * state.error_ema + ERROR_ALPHA * window_rate;
        }

        state.last_dispatch = dispatch;
        state.last_events = events;
        state.last_tick = now;

        // Sustained error-rate thresholds
        if state.error_ema > CRITICAL_RATIO {
            if state.critical_since.is_none() {
                state.critical_since = Some(now);
            }
        } else {
            state.critical_since = None;
        }
        if state.error_ema > ELEVATED_RATIO {
            if state.elevated_since.is_none() {
                state.elevated_since = Some(now);
            }
        } else {
            state.elevated_since = None;
        }

        let ema = state.error_ema;
        if state
            .critical_since
            .is_some_and(|since| now.duration_since(since) >= SUSTAIN)
        {
            push_alert(
                &mut state,
                AlertLevel::Critical,
                format!("error rate critical: {:.0}%", ema * 100.0),
            );
            state.critical_since = Some(now); // re-alert after another sustain window
        } else if state
            .elevated_since
            .is_some_and(|since| now.duration_since(since) >= SUSTAIN)
        {
            push_alert(
                &mut state,
                AlertLevel::Elevated,
                format!("error rate elevated: {:.0}%", ema * 100.0),
            );
            state.elevated_since = Some(now);
        }

        // Queue depth: alert on crossing, clear silently
        if fill > QUEUE_RATIO && !state.queue_alerted {
            state.queue_alerted = true;
            push_alert(
                &mut state,
                AlertLevel::Elevated,
                format!("queue at {:.0}% of capacity", fill * 100.0),
            );
        } else if fill <= QUEUE_RATIO {
            state.queue_alerted = false;
        }

        // Sender availability
        if eligible == 0 && !state.senders_alerted {
            state.senders_alerted = true;
            push_alert(
                &mut state,
                AlertLevel::Critical,
                "no eligible senders".to_string(),
            );
        } else if eligible > 0 {
            state.senders_alerted = false;
        }
    }

    /// Current health view for `health()` and the status endpoint
    pub fn report(&self) -> HealthReport {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let eligible = self.dispatcher.pool().eligible_count();
        let (depths, _) = self.dispatcher.queue_depths();

        let status = if eligible == 0 || state.error_ema > CRITICAL_RATIO {
            HealthStatus::Critical
        } else if state.error_ema > ELEVATED_RATIO
            || self.dispatcher.queue_fill_ratio() > QUEUE_RATIO
        {
            HealthStatus::Elevated
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            throughput: state.throughput,
            error_rate_ema: state.error_ema,
            queue_len: self.dispatcher.queue_len(),
            queue_capacity: self.dispatcher.queue_capacity(),
            queue_depths: depths,
            eligible_senders: eligible,
            senders: self.dispatcher.pool().snapshot(),
            circuit_open: self.dispatcher.circuit_open(),
            recent_alerts: state.alerts.clone(),
        }
    }
}

fn push_alert(state: &mut MonitorState, level: AlertLevel, message: String) {
    match level {
        AlertLevel::Critical => tracing::error!(alert = %message, "health alert"),
        AlertLevel::Elevated => tracing::warn!(alert = %message, "health alert"),
    }
    state.alerts.push(Alert {
        level,
        message,
        at: Utc::now(),
    });
    if state.alerts.len() > ALERT_HISTORY {
        let excess = state.alerts.len() - ALERT_HISTORY;
        state.alerts.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_dispatch::{DispatchTask, DispatcherConfig, SenderPool, TaskAction};
    use relay_filter::{FilterEngine, FilterPolicy};
    use relay_protocol::{
        ChatId, Entity, FileRef, ListenError, MediaKind, MsgId, Priority, SendError, Sender,
        SenderId, SourceEvent, SourceListener, UserId,
    };
    use relay_store::{NewPair, SenderBinding, Store};
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    struct NullSender;

    #[async_trait]
    impl Sender for NullSender {
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

        async fn kick_user(&self, _chat: ChatId, _user: UserId) -> Result<(), SendError> {
            Ok(())
        }

        async fn unban_user(&self, _chat: ChatId, _user: UserId) -> Result<(), SendError> {
            Ok(())
        }
    }

    struct NullListener;

    #[async_trait]
    impl SourceListener for NullListener {
        async fn run(
            &self,
            _events: mpsc::Sender<SourceEvent>,
            cancel: CancellationToken,
        ) -> Result<(), ListenError> {
            cancel.cancelled().await;
            Ok(())
        }

        async fn download(&self, file: &FileRef) -> Result<Vec<u8>, ListenError> {
            Err(ListenError::Download {
                file: file.as_str().to_string(),
                reason: "null listener".into(),
            })
        }
    }

    fn rig(with_sender: bool, queue_capacity: usize) -> (Arc<HealthMonitor>, Arc<Dispatcher>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .create_pair(NewPair {
                source_chat: ChatId(100),
                destination_chat: ChatId(200),
                name: "m".into(),
                binding: SenderBinding::Pool,
                filters: FilterPolicy::default(),
            })
            .unwrap();

        let pool = Arc::new(SenderPool::new());
        if with_sender {
            pool.register(SenderId(1), "n", Arc::new(NullSender));
        }

        let config = DispatcherConfig {
            queue_capacity,
            ..DispatcherConfig::default()
        };
        let dispatcher = Dispatcher::new(config, pool, store.clone());

        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            Arc::new(FilterEngine::new()),
            Arc::new(relay_image::ImageGuard::new(store, 5)),
            dispatcher.clone(),
            Arc::new(NullListener),
            1,
            Arc::new(AtomicBool::new(false)),
        ));

        let monitor = Arc::new(HealthMonitor::new(
            dispatcher.clone(),
            pipeline,
            Duration::from_secs(10),
        ));
        (monitor, dispatcher)
    }

    #[tokio::test]
    async fn test_healthy_with_senders_and_quiet_queue() {
        let (monitor, _) = rig(true, 100);
        monitor.tick(Instant::now());
        let report = monitor.report();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.eligible_senders, 1);
        assert!(report.recent_alerts.is_empty());
    }

    #[tokio::test]
    async fn test_no_senders_is_critical() {
        let (monitor, _) = rig(false, 100);
        monitor.tick(Instant::now());

        let report = monitor.report();
        assert_eq!(report.status, HealthStatus::Critical);
        assert!(report
            .recent_alerts
            .iter()
            .any(|a| a.level == AlertLevel::Critical && a.message.contains("eligible")));

        // The alert fires once, not every tick
        monitor.tick(Instant::now());
        assert_eq!(monitor.report().recent_alerts.len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_alerts() {
        let (monitor, dispatcher) = rig(true, 5);
        for i in 0..5 {
            dispatcher
                .enqueue(
                    DispatchTask::new(
                        relay_protocol::PairId(1),
                        ChatId(200),
                        TaskAction::Delete { dest_msg: MsgId(i) },
                        Priority::Normal,
                    ),
                )
                .unwrap();
        }

        monitor.tick(Instant::now());
        let report = monitor.report();
        assert_eq!(report.status, HealthStatus::Elevated);
        assert!(report
            .recent_alerts
            .iter()
            .any(|a| a.message.contains("capacity")));
    }
}
