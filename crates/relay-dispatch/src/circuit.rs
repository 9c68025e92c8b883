//! Rolling-window circuit breaker
//!
//! Tracks send outcomes over a sliding one-minute window. When the failure
//! ratio crosses the open threshold, new enqueues below High priority are
//! rejected until the ratio falls back under the close threshold. The gap
//! between the two thresholds keeps the breaker from flapping.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use relay_protocol::Priority;

const WINDOW: Duration = Duration::from_secs(60);
const OPEN_RATIO: f64 = 0.25;
const CLOSE_RATIO: f64 = 0.10;

/// Outcomes below this count never open the breaker; a single early failure
/// is not a trend.
const MIN_SAMPLES: usize = 10;

#[derive(Debug)]
pub struct CircuitBreaker {
    outcomes: Mutex<VecDeque<(Instant, bool)>>,
    open: AtomicBool,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(false),
        }
    }

    /// Record a send outcome and update the breaker state
    pub fn record(&self, success: bool) {
        self.record_at(success, Instant::now());
    }

    fn record_at(&self, success: bool, now: Instant) {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.push_back((now, success));
        while let Some(&(t, _)) = outcomes.front() {
            if now.duration_since(t) > WINDOW {
                outcomes.pop_front();
            } else {
                break;
            }
        }

        let total = outcomes.len();
        if total < MIN_SAMPLES {
            return;
        }
        let failures = outcomes.iter().filter(|(_, ok)| !ok).count();
        let ratio = failures as f64 / total as f64;

        let was_open = self.open.load(Ordering::Relaxed);
        if !was_open && ratio > OPEN_RATIO {
            self.open.store(true, Ordering::Relaxed);
            tracing::warn!(
                failure_ratio = format!("{:.0}%", ratio * 100.0),
                window_secs = WINDOW.as_secs(),
                "circuit breaker opened, rejecting below-High enqueues"
            );
        } else if was_open && ratio < CLOSE_RATIO {
            self.open.store(false, Ordering::Relaxed);
            tracing::info!(
                failure_ratio = format!("{:.0}%", ratio * 100.0),
                "circuit breaker closed"
            );
        }
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Whether an enqueue at `priority` is admitted right now
    #[inline]
    pub fn admits(&self, priority: Priority) -> bool {
        !self.is_open() || priority >= Priority::High
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(cb: &CircuitBreaker, successes: usize, failures: usize, at: Instant) {
        for _ in 0..successes {
            cb.record_at(true, at);
        }
        for _ in 0..failures {
            cb.record_at(false, at);
        }
    }

    #[test]
    fn test_closed_under_min_samples() {
        let cb = CircuitBreaker::new();
        fill(&cb, 0, 5, Instant::now());
        assert!(!cb.is_open());
    }

    #[test]
    fn test_opens_above_threshold() {
        let cb = CircuitBreaker::new();
        // 30% failures over 20 samples
        fill(&cb, 14, 6, Instant::now());
        assert!(cb.is_open());
        assert!(!cb.admits(Priority::Normal));
        assert!(!cb.admits(Priority::Low));
        assert!(cb.admits(Priority::High));
        assert!(cb.admits(Priority::Urgent));
    }

    #[test]
    fn test_hysteresis_holds_between_thresholds() {
        let cb = CircuitBreaker::new();
        let now = Instant::now();
        fill(&cb, 14, 6, now); // 30% -> open
        assert!(cb.is_open());

        // Drive the ratio down to ~15%: above close threshold, stays open
        fill(&cb, 20, 0, now);
        assert!(cb.is_open());

        // Push it below 10%: closes
        fill(&cb, 60, 0, now);
        assert!(!cb.is_open());
        assert!(cb.admits(Priority::Low));
    }

    #[test]
    fn test_old_outcomes_age_out() {
        let cb = CircuitBreaker::new();
        let past = Instant::now() - Duration::from_secs(120);
        fill(&cb, 0, 20, past);

        // Recording now prunes the stale window before judging
        fill(&cb, MIN_SAMPLES, 0, Instant::now());
        assert!(!cb.is_open());
    }
}
