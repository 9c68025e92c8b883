//! Relay - Filter
//!
//! Per-pair message filtering: decide whether a message is copied at all and,
//! if so, rewrite its text and formatting entities.
//!
//! # Order of operations
//!
//! The order is fixed; changing it changes semantics:
//!
//! 1. Global word block (against the original text, short-circuit)
//! 2. Pair word block (same)
//! 3. Custom drop patterns
//! 4. Forward / link gates
//! 5. Media-type gate
//! 6. Header strip (leading lines only)
//! 7. Footer strip (trailing lines only)
//! 8. Mention removal (+ in-line space collapsing)
//! 9. Length gate (on the final text)
//!
//! # Design Principles
//!
//! - **Pure**: no I/O; the engine only caches compiled regexes
//! - **Line-preserving**: steps 6-8 never change the newline count except by
//!   dropping blank lines orphaned by a removed header/footer line
//! - **Failure-isolated**: a user pattern that fails to compile disables that
//!   pattern with a warning, never the whole pair

mod engine;
mod entities;
mod mentions;
mod policy;
mod strip;
mod words;

pub use engine::{DropReason, FilterEngine, FilterOutcome};
pub use entities::{apply_edits, Edit};
pub use policy::FilterPolicy;
