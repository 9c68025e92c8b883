//! Dispatch tasks

use std::sync::Arc;
use std::time::Instant;

use relay_protocol::{ChatId, Entity, MediaKind, MsgId, PairId, Priority, SenderId, UserId};
use relay_store::{Mapping, MappingKind};

/// What the worker should do at the destination
#[derive(Debug, Clone)]
pub enum TaskAction {
    SendText {
        text: String,
        entities: Vec<Entity>,
        reply_to: Option<MsgId>,
        disable_preview: bool,
    },
    SendMedia {
        kind: MediaKind,
        /// Shared so retries do not clone payloads
        bytes: Arc<Vec<u8>>,
        caption: String,
        entities: Vec<Entity>,
        reply_to: Option<MsgId>,
    },
    EditText {
        dest_msg: MsgId,
        text: String,
        entities: Vec<Entity>,
    },
    Delete {
        dest_msg: MsgId,
    },
    Kick {
        user: UserId,
    },
    Unban {
        user: UserId,
    },
}

impl TaskAction {
    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendText { .. } => "send_text",
            Self::SendMedia { .. } => "send_media",
            Self::EditText { .. } => "edit_text",
            Self::Delete { .. } => "delete",
            Self::Kick { .. } => "kick",
            Self::Unban { .. } => "unban",
        }
    }

    /// Whether this action creates a new destination message
    pub fn is_send(&self) -> bool {
        matches!(self, Self::SendText { .. } | Self::SendMedia { .. })
    }

    /// Whether this action mutates an existing destination message
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::EditText { .. } | Self::Delete { .. })
    }
}

/// Mapping fields known before the send completes
///
/// The worker fills in `dest_msg` and the sender id from the ack and writes
/// the full [`Mapping`].
#[derive(Debug, Clone)]
pub struct MappingDraft {
    pub source_msg: MsgId,
    pub source_chat: ChatId,
    pub kind: MappingKind,
    pub has_media: bool,
    pub reply_to_source: Option<MsgId>,
    pub reply_to_dest: Option<MsgId>,
}

impl MappingDraft {
    pub(crate) fn into_mapping(
        self,
        pair: PairId,
        dest_chat: ChatId,
        dest_msg: MsgId,
        sender: SenderId,
    ) -> Mapping {
        Mapping {
            source_msg: self.source_msg,
            dest_msg,
            pair,
            sender,
            source_chat: self.source_chat,
            dest_chat,
            kind: self.kind,
            has_media: self.has_media,
            reply_to_source: self.reply_to_source,
            reply_to_dest: self.reply_to_dest,
        }
    }
}

/// One unit of outbound work
#[derive(Debug, Clone)]
pub struct DispatchTask {
    /// Pair this task belongs to; admin-origin tasks (kick/unban) have none
    pub pair: Option<PairId>,
    pub dest_chat: ChatId,
    /// Source message driving this task, when there is one
    pub source_msg: Option<MsgId>,
    pub action: TaskAction,
    pub priority: Priority,
    /// Completed send attempts so far
    pub attempts: u32,
    /// Not dispatched before this instant
    pub earliest_send_at: Instant,
    /// Pair-bound sender, honored while it is eligible
    pub preferred_sender: Option<SenderId>,
    /// Written to the store when a send action acks
    pub mapping: Option<MappingDraft>,
}

impl DispatchTask {
    /// A task ready to run immediately
    pub fn new(pair: PairId, dest_chat: ChatId, action: TaskAction, priority: Priority) -> Self {
        Self {
            pair: Some(pair),
            dest_chat,
            source_msg: None,
            action,
            priority,
            attempts: 0,
            earliest_send_at: Instant::now(),
            preferred_sender: None,
            mapping: None,
        }
    }

    /// An admin-origin task with no owning pair
    pub fn admin(dest_chat: ChatId, action: TaskAction, priority: Priority) -> Self {
        Self {
            pair: None,
            dest_chat,
            source_msg: None,
            action,
            priority,
            attempts: 0,
            earliest_send_at: Instant::now(),
            preferred_sender: None,
            mapping: None,
        }
    }

    #[must_use]
    pub fn with_source_msg(mut self, msg: MsgId) -> Self {
        self.source_msg = Some(msg);
        self
    }

    #[must_use]
    pub fn with_preferred_sender(mut self, sender: Option<SenderId>) -> Self {
        self.preferred_sender = sender;
        self
    }

    #[must_use]
    pub fn with_mapping(mut self, draft: MappingDraft) -> Self {
        self.mapping = Some(draft);
        self
    }

    /// Whether the task may run now
    #[inline]
    pub fn is_ready(&self, now: Instant) -> bool {
        self.earliest_send_at <= now
    }
}
