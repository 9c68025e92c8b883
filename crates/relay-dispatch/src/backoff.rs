//! Retry backoff
//!
//! `min(base * 2^(attempt-1) + jitter, cap)` with `jitter` uniform in
//! `[0, base)`. Ignoring jitter the delay is monotone in the attempt number.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based)
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let attempt = attempt.max(1);
    let exp = base.as_secs_f64() * 2f64.powi((attempt - 1).min(30) as i32);
    let jitter = rand::thread_rng().gen_range(0.0..base.as_secs_f64().max(f64::EPSILON));
    Duration::from_secs_f64((exp + jitter).min(cap.as_secs_f64()))
}
