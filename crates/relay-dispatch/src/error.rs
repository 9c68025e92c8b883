//! Dispatch error types

use thiserror::Error;

/// Why a task was not accepted into the queue
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// The queue is at capacity
    #[error("dispatch queue full")]
    QueueFull,

    /// The circuit breaker is open and the task is below High priority
    #[error("backpressure: failure rate too high, rejecting below-High traffic")]
    Backpressure,

    /// The dispatcher is shutting down
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}
