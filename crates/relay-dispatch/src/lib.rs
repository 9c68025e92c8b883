//! Relay - Dispatch
//!
//! The outbound half of the engine: a bounded four-level priority queue, a
//! worker pool that executes tasks against the sender pool, retry with
//! exponential backoff, a rolling-window circuit breaker, and the
//! health-aware sender selection policy.
//!
//! # Task lifecycle
//!
//! ```text
//! Pending --pop--> InFlight --ack--> Done
//!              |            |
//!              |            +--transient-fail--> Retrying --delay--> Pending
//!              |            |
//!              |            +--permanent-fail--> Failed
//!              +--cancel--> Cancelled
//! ```
//!
//! Terminal states are Done, Failed and Cancelled. A retried send is only
//! re-executed if no mapping exists yet for its `(source_msg, pair)` key, so
//! destination duplicates stay unlikely even under at-least-once delivery.
//!
//! # Ordering
//!
//! Within a priority the queue is FIFO. Edits and deletes for the same
//! source message serialize on a shard-striped lock keyed by
//! `(pair, source_msg)`; ordering across different source messages is not
//! guaranteed once the pool load-balances.

mod backoff;
mod circuit;
mod dispatcher;
mod error;
mod locks;
mod metrics;
mod pool;
mod queue;
mod task;

pub use backoff::backoff_delay;
pub use circuit::CircuitBreaker;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::EnqueueError;
pub use locks::ShardedLocks;
pub use metrics::{DispatchMetrics, DispatchSnapshot};
pub use pool::{Selection, SenderHandle, SenderPool, SenderSnapshot};
pub use queue::{PriorityQueue, PushError};
pub use task::{DispatchTask, MappingDraft, TaskAction};
