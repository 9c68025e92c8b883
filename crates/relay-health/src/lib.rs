//! Relay - Health
//!
//! Rolling health metrics with threshold alerts, and the hourly sweeper that
//! revokes expired destination-chat subscriptions.
//!
//! # Alerts
//!
//! - error-rate EMA above 25% sustained for 60 s: elevated; above 50%:
//!   critical
//! - queue depth above 80% of capacity
//! - fewer than one eligible sender
//!
//! Alerts are emitted through `tracing` and retained for the admin
//! `health()` view.

mod monitor;
mod sweeper;

pub use monitor::{Alert, AlertLevel, HealthMonitor, HealthReport, HealthStatus};
pub use sweeper::SubscriptionSweeper;
