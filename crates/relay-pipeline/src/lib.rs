//! Relay - Pipeline
//!
//! Per-event orchestration: a source event fans out over the pairs listening
//! to its chat, runs the filter engine and the image guard, resolves reply
//! links through the mapping store, and submits dispatch tasks.
//!
//! # Order of work for a new message
//!
//! Filter first, then reply resolution, then media work, then dispatch. A
//! reply whose target was filtered away (no mapping) is sent without a reply
//! link; nothing ever waits for a mapping to appear.
//!
//! # Isolation
//!
//! A failing pair only loses its own copy: every per-pair step catches and
//! counts its errors, and the event loop never propagates anything back to
//! the listener.

mod metrics;
mod pipeline;

pub use metrics::{PipelineMetrics, PipelineSnapshot};
pub use pipeline::Pipeline;
