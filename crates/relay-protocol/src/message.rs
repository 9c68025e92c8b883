//! Message snapshots
//!
//! A [`MessageEvent`] is an immutable snapshot of a source message as the
//! listener observed it. The pipeline never mutates a snapshot; filters
//! produce rewritten copies of the text and entity list instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MsgId, UserId};

/// Coarse media classification used by the per-pair media gate
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Webpage,
    Unknown,
}

impl MediaKind {
    /// Parse the platform's tag string, mapping anything unrecognised to
    /// `Unknown` rather than failing.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" => Self::Text,
            "photo" => Self::Photo,
            "video" => Self::Video,
            "document" => Self::Document,
            "audio" => Self::Audio,
            "voice" => Self::Voice,
            "sticker" => Self::Sticker,
            "webpage" => Self::Webpage,
            _ => Self::Unknown,
        }
    }

    /// Tag string as used in filter policies and config files
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Sticker => "sticker",
            Self::Webpage => "webpage",
            Self::Unknown => "unknown",
        }
    }
}

/// Opaque handle the listener can resolve to media bytes
///
/// The engine never interprets the contents; it is whatever the platform
/// adapter needs to re-fetch the payload (a file id, a URL, a local path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn new(r: impl Into<String>) -> Self {
        Self(r.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Media attachment descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub kind: MediaKind,
    /// MIME type when the platform reports one (documents mostly)
    pub mime: Option<String>,
    pub file: FileRef,
}

impl Media {
    /// Whether this attachment decodes to a raster image
    ///
    /// Photos always do; documents only when their MIME type says so. This is
    /// the gate for perceptual-hash checks and watermarking.
    pub fn is_image(&self) -> bool {
        match self.kind {
            MediaKind::Photo => true,
            MediaKind::Document => self
                .mime
                .as_deref()
                .is_some_and(|m| m.starts_with("image/")),
            _ => false,
        }
    }
}

/// Kind of a formatting entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
    Pre,
    Spoiler,
    Link,
    Mention,
}

/// A flat formatting range over the message text
///
/// Ranges are `[start, end)` byte offsets into the UTF-8 text. Entities never
/// nest structurally; overlapping ranges are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub start: usize,
    pub end: usize,
    pub kind: EntityKind,
    /// Kind-specific payload (the URL for `Link`, the user id for `Mention`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<String>,
}

impl Entity {
    pub fn new(start: usize, end: usize, kind: EntityKind) -> Self {
        Self {
            start,
            end,
            kind,
            attrs: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Immutable snapshot of a source message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub id: MsgId,
    pub chat: ChatId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<UserId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MsgId>,
    /// Whether the platform flagged this message as forwarded from elsewhere
    #[serde(default)]
    pub forwarded: bool,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    /// Effective media kind for the media-type gate (`Text` when no media)
    pub fn media_kind(&self) -> MediaKind {
        self.media.as_ref().map(|m| m.kind).unwrap_or(MediaKind::Text)
    }

    /// Whether the attachment (if any) is an image per [`Media::is_image`]
    pub fn has_image(&self) -> bool {
        self.media.as_ref().is_some_and(Media::is_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_tag_round_trip() {
        for kind in [
            MediaKind::Text,
            MediaKind::Photo,
            MediaKind::Video,
            MediaKind::Document,
            MediaKind::Audio,
            MediaKind::Voice,
            MediaKind::Sticker,
            MediaKind::Webpage,
            MediaKind::Unknown,
        ] {
            assert_eq!(MediaKind::from_tag(kind.as_tag()), kind);
        }
        assert_eq!(MediaKind::from_tag("animated_emoji"), MediaKind::Unknown);
    }

    #[test]
    fn test_image_documents() {
        let photo = Media {
            kind: MediaKind::Photo,
            mime: None,
            file: FileRef::new("f1"),
        };
        assert!(photo.is_image());

        let png = Media {
            kind: MediaKind::Document,
            mime: Some("image/png".into()),
            file: FileRef::new("f2"),
        };
        assert!(png.is_image());

        let pdf = Media {
            kind: MediaKind::Document,
            mime: Some("application/pdf".into()),
            file: FileRef::new("f3"),
        };
        assert!(!pdf.is_image());

        let video = Media {
            kind: MediaKind::Video,
            mime: Some("video/mp4".into()),
            file: FileRef::new("f4"),
        };
        assert!(!video.is_image());
    }

    #[test]
    fn test_entity_len() {
        let e = Entity::new(3, 8, EntityKind::Bold);
        assert_eq!(e.len(), 5);
        assert!(!e.is_empty());

        let inverted = Entity::new(8, 3, EntityKind::Bold);
        assert_eq!(inverted.len(), 0);
        assert!(inverted.is_empty());
    }
}
