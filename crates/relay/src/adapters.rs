//! Development platform adapters
//!
//! Real deployments implement `SourceListener` and `Sender` against the chat
//! platform's wire protocol. These adapters exist so the engine can be run
//! and exercised without one: the listener reads JSON-encoded events from
//! stdin (one per line) and resolves media references as local file paths;
//! the sender prints what it would have sent.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use relay_protocol::{
    ChatId, Entity, FileRef, ListenError, MediaKind, MessageEvent, MsgId, SendError, Sender,
    SourceEvent, SourceListener, UserId,
};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wire shape of a stdin event line
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventLine {
    New(MessageEvent),
    Edit(MessageEvent),
    Delete { chat: ChatId, ids: Vec<MsgId> },
}

impl From<EventLine> for SourceEvent {
    fn from(line: EventLine) -> Self {
        match line {
            EventLine::New(msg) => SourceEvent::New(msg),
            EventLine::Edit(msg) => SourceEvent::Edit(msg),
            EventLine::Delete { chat, ids } => SourceEvent::Delete { chat, ids },
        }
    }
}

/// Listener that replays JSONL events from stdin
#[derive(Debug, Default)]
pub struct StdinListener;

#[async_trait]
impl SourceListener for StdinListener {
    async fn run(
        &self,
        events: mpsc::Sender<SourceEvent>,
        cancel: CancellationToken,
    ) -> Result<(), ListenError> {
        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = cancel.cancelled() => return Ok(()),
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return Ok(()),
                Err(err) => return Err(ListenError::Connection(err.to_string())),
            };
            if line.trim().is_empty() {
                continue;
            }

            let event: EventLine = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unparseable event line");
                    continue;
                }
            };

            // Bounded wait: a stuck pipeline must not wedge the input loop.
            let send = events.send_timeout(event.into(), std::time::Duration::from_millis(50));
            if let Err(err) = send.await {
                tracing::warn!(error = %err, "event dropped, pipeline not keeping up");
            }
        }
    }

    /// Dev semantics: a media reference is a local file path
    async fn download(&self, file: &FileRef) -> Result<Vec<u8>, ListenError> {
        tokio::fs::read(file.as_str())
            .await
            .map_err(|err| ListenError::Download {
                file: file.as_str().to_string(),
                reason: err.to_string(),
            })
    }
}

/// Sender that narrates instead of sending
#[derive(Debug)]
pub struct ConsoleSender {
    label: String,
    next_id: AtomicI64,
}

impl ConsoleSender {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            next_id: AtomicI64::new(1),
        }
    }

    fn allocate(&self) -> MsgId {
        MsgId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl Sender for ConsoleSender {
    async fn send_text(
        &self,
        chat: ChatId,
        text: &str,
        entities: &[Entity],
        reply_to: Option<MsgId>,
        _disable_preview: bool,
    ) -> Result<MsgId, SendError> {
        let id = self.allocate();
        tracing::info!(
            sender = %self.label,
            chat = %chat,
            msg = %id,
            reply_to = ?reply_to,
            entities = entities.len(),
            text,
            "send_text"
        );
        Ok(id)
    }

    async fn send_media(
        &self,
        chat: ChatId,
        kind: MediaKind,
        bytes: &[u8],
        caption: &str,
        _entities: &[Entity],
        reply_to: Option<MsgId>,
    ) -> Result<MsgId, SendError> {
        let id = self.allocate();
        tracing::info!(
            sender = %self.label,
            chat = %chat,
            msg = %id,
            kind = kind.as_tag(),
            bytes = bytes.len(),
            reply_to = ?reply_to,
            caption,
            "send_media"
        );
        Ok(id)
    }

    async fn edit_text(
        &self,
        chat: ChatId,
        msg: MsgId,
        text: &str,
        _entities: &[Entity],
    ) -> Result<(), SendError> {
        tracing::info!(sender = %self.label, chat = %chat, msg = %msg, text, "edit_text");
        Ok(())
    }

    async fn delete_message(&self, chat: ChatId, msg: MsgId) -> Result<(), SendError> {
        tracing::info!(sender = %self.label, chat = %chat, msg = %msg, "delete_message");
        Ok(())
    }

    async fn kick_user(&self, chat: ChatId, user: UserId) -> Result<(), SendError> {
        tracing::info!(sender = %self.label, chat = %chat, user = %user, "kick_user");
        Ok(())
    }

    async fn unban_user(&self, chat: ChatId, user: UserId) -> Result<(), SendError> {
        tracing::info!(sender = %self.label, chat = %chat, user = %user, "unban_user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_shapes() {
        let new: EventLine = serde_json::from_str(
            r#"{"type":"new","id":1,"chat":100,"text":"hi","timestamp":"2026-08-02T12:00:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(
            SourceEvent::from(new),
            SourceEvent::New(ref m) if m.text == "hi" && m.chat == ChatId(100)
        ));

        let delete: EventLine =
            serde_json::from_str(r#"{"type":"delete","chat":100,"ids":[1,2]}"#).unwrap();
        assert!(matches!(
            SourceEvent::from(delete),
            SourceEvent::Delete { chat, ref ids } if chat == ChatId(100) && ids.len() == 2
        ));
    }

    #[test]
    fn test_event_line_with_media() {
        let raw = r#"{"type":"new","id":3,"chat":100,"text":"pic",
            "media":{"kind":"photo","mime":null,"file":"/tmp/a.png"},
            "timestamp":"2026-08-02T12:00:00Z"}"#;
        let line: EventLine = serde_json::from_str(raw).unwrap();
        match SourceEvent::from(line) {
            SourceEvent::New(msg) => {
                let media = msg.media.unwrap();
                assert_eq!(media.kind, MediaKind::Photo);
                assert_eq!(media.file.as_str(), "/tmp/a.png");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_console_sender_allocates_ids() {
        let sender = ConsoleSender::new("dev");
        let a = sender
            .send_text(ChatId(1), "x", &[], None, false)
            .await
            .unwrap();
        let b = sender
            .send_text(ChatId(1), "y", &[], None, false)
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
