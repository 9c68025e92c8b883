//! Outbound write abstraction
//!
//! A [`Sender`] is one sending identity on the platform. The dispatcher picks
//! one per task; the engine never cares how the bytes reach the wire.
//!
//! # Error taxonomy
//!
//! Every platform error collapses into one of three kinds, which is all the
//! retry machinery needs:
//!
//! - `Transient` - network hiccups, 5xx-equivalents; retry with backoff
//! - `RateLimited` - the platform told us to wait; honor the delay, the
//!   attempt does not count against the sender's failure streak
//! - `Permanent` - auth/permission/missing-chat; drop the task immediately

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::{ChatId, MsgId, UserId};
use crate::message::{Entity, MediaKind};

/// Send failure, classified for retry decisions
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// Retryable failure (network error, server-side 5xx equivalent)
    #[error("transient send failure: {0}")]
    Transient(String),

    /// The platform asked us to slow down
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Non-retryable failure (auth revoked, no permission, chat gone)
    #[error("permanent send failure [{code}]: {message}")]
    Permanent { code: String, message: String },
}

impl SendError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the dispatcher may re-enqueue the task after this failure
    #[inline]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permanent { .. })
    }
}

/// One sending identity
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// concurrently; the worker pool shares them freely.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Send a text message, returning the new message's id
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        entities: &[Entity],
        reply_to: Option<MsgId>,
        disable_preview: bool,
    ) -> Result<MsgId, SendError>;

    /// Send a media message with an optional caption
    async fn send_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        bytes: &[u8],
        caption: &str,
        entities: &[Entity],
        reply_to: Option<MsgId>,
    ) -> Result<MsgId, SendError>;

    /// Rewrite the text of an existing message
    async fn edit_text(
        &self,
        chat: ChatId,
        msg: MsgId,
        text: &str,
        entities: &[Entity],
    ) -> Result<(), SendError>;

    /// Delete a message
    async fn delete_message(&self, chat: ChatId, msg: MsgId) -> Result<(), SendError>;

    /// Remove a user from a chat
    async fn kick_user(&self, chat: ChatId, user: UserId) -> Result<(), SendError>;

    /// Lift a previously applied ban
    async fn unban_user(&self, chat: ChatId, user: UserId) -> Result<(), SendError>;

    /// Cheap liveness check used by the unhealthy-sender probe
    ///
    /// Default implementation reports success; platform adapters should
    /// override with a real round-trip.
    async fn probe(&self) -> Result<(), SendError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(SendError::transient("connection reset").is_retryable());
        assert!(SendError::rate_limited(Duration::from_secs(5)).is_retryable());
        assert!(!SendError::permanent("forbidden", "bot was kicked").is_retryable());
    }

    #[test]
    fn test_display() {
        let err = SendError::permanent("chat_not_found", "no such chat");
        let s = err.to_string();
        assert!(s.contains("chat_not_found"));
        assert!(s.contains("no such chat"));
    }
}
