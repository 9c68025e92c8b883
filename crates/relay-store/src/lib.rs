//! Relay - Store
//!
//! SQLite persistence for the replication engine: the pair registry, the
//! message-mapping table that powers edit/delete synchronization, sender
//! records, block lists, subscriptions, settings and the error log.
//!
//! # Concurrency model
//!
//! One WAL-mode connection behind a short-held mutex serializes all SQL; no
//! lock is ever held across an await point because nothing here is async.
//! The two hot-path lookups (`pairs_by_source_chat`, blocked-image scans)
//! are served from copy-on-write in-memory indexes that mutations rebuild,
//! so readers only clone an `Arc`.
//!
//! # Durability stance
//!
//! A failed mapping write after a successful platform send must not undo the
//! send (the copy already exists); callers log and continue. Everything else
//! surfaces as [`StoreError`] and is retryable at the caller's discretion.

mod blocklist;
mod database;
mod error;
mod index;
mod maintenance;
mod mappings;
mod migrations;
mod models;
mod pairs;
mod senders;
mod settings;
mod store;
mod subscriptions;

pub use blocklist::hamming;
pub use error::{Result, StoreError};
pub use maintenance::{CleanupReport, StoreSummary};
pub use models::{
    BlockScope, BlockedImage, Mapping, MappingKind, NewPair, Pair, PairStats, PairStatus,
    SenderBinding, SenderRecord, StatDelta, Subscription,
};
pub use store::Store;
