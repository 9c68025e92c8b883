//! Relay - Protocol
//!
//! Core types shared across the replication engine, plus the two traits that
//! abstract the chat platform: `SourceListener` (inbound events) and `Sender`
//! (outbound writes).
//!
//! # Overview
//!
//! The engine never talks to the platform's wire protocol directly. One
//! privileged listener identity observes source chats and produces
//! [`SourceEvent`]s; a pool of sending identities implements [`Sender`] and
//! performs the actual writes. Everything in between (filtering, dispatch,
//! mapping bookkeeping) works on the types defined here.
//!
//! # Modules
//!
//! - `ids` - Newtype identifiers for chats, messages, pairs, senders, users
//! - `message` - Message snapshots, formatting entities, media descriptors
//! - `listener` - Inbound event stream abstraction
//! - `sender` - Outbound write abstraction and the send-error taxonomy
//! - `priority` - Dispatch priority levels

mod ids;
mod listener;
mod message;
mod priority;
mod sender;

pub use ids::{ChatId, MsgId, PairId, SenderId, UserId};
pub use listener::{ListenError, SourceEvent, SourceListener};
pub use message::{Entity, EntityKind, FileRef, Media, MediaKind, MessageEvent};
pub use priority::Priority;
pub use sender::{SendError, Sender};
