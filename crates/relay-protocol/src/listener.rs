//! Inbound event stream abstraction
//!
//! The listener is the single privileged identity that observes source chats.
//! It produces [`SourceEvent`]s into a channel the pipeline consumes and can
//! re-fetch media payloads on demand.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ids::{ChatId, MsgId};
use crate::message::{FileRef, MessageEvent};

/// Listener-side failure
#[derive(Debug, Error)]
pub enum ListenError {
    /// The underlying connection to the platform failed
    #[error("listener connection error: {0}")]
    Connection(String),

    /// A media payload could not be fetched
    #[error("media download failed for {file}: {reason}")]
    Download { file: String, reason: String },

    /// The event stream ended (platform closed the session)
    #[error("event stream closed")]
    Closed,
}

/// One observed change in a source chat
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A message was posted
    New(MessageEvent),

    /// A previously posted message changed
    Edit(MessageEvent),

    /// One or more messages disappeared
    ///
    /// The platform only reports ids, not content; the mapping store is what
    /// turns these back into destination deletes.
    Delete { chat: ChatId, ids: Vec<MsgId> },
}

impl SourceEvent {
    /// The source chat this event concerns
    pub fn chat(&self) -> ChatId {
        match self {
            Self::New(m) | Self::Edit(m) => m.chat,
            Self::Delete { chat, .. } => *chat,
        }
    }

    /// Short label for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::New(_) => "new",
            Self::Edit(_) => "edit",
            Self::Delete { .. } => "delete",
        }
    }
}

/// The platform's inbound side
///
/// `run` is expected to block (asynchronously) for the life of the process,
/// pushing events into `events` until cancellation. Pushes must give up after
/// a short bounded wait rather than stall the platform session; a full
/// channel is the pipeline's problem, not the listener's.
#[async_trait]
pub trait SourceListener: Send + Sync {
    /// Consume the platform event stream until `cancel` fires
    async fn run(
        &self,
        events: mpsc::Sender<SourceEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ListenError>;

    /// Fetch the bytes behind a media reference
    async fn download(&self, file: &FileRef) -> Result<Vec<u8>, ListenError>;
}
