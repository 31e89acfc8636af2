//! Messages received from the remote feed.
//!
//! These are the archiver's own types; the Telegram adapter converts its wire
//! format into them so the rest of the crate never sees Bot API JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One item returned by a poll. Lives for a single poll cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    /// Strictly increasing id assigned by the remote
    pub id: i64,

    /// The message carried by this update, if any
    pub message: Option<Message>,
}

/// A received message. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message id within its chat
    pub id: i64,

    /// When the message was sent
    pub timestamp: DateTime<Utc>,

    /// Origin chat
    pub chat_id: i64,

    /// Kind-specific payload
    pub content: MessageContent,

    /// Caption attached to media messages
    pub caption: Option<String>,

    /// The message this one replies to
    pub reply_to: Option<Box<Message>>,
}

/// Reference to a file stored on the remote side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
    pub file_size: Option<u64>,
}

impl FileRef {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_size: None,
        }
    }
}

/// Metadata returned by the remote for a file reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub file_id: String,

    /// Server-side path used for the download URL
    pub file_path: Option<String>,

    pub file_size: Option<u64>,
}

/// Payload of a message, one variant per kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Photo {
        /// Available sizes, smallest first
        sizes: Vec<FileRef>,
    },
    Video {
        file: FileRef,
    },
    Document {
        file: FileRef,
        file_name: Option<String>,
    },
    Audio {
        file: FileRef,
        file_name: Option<String>,
    },
    Voice {
        file: FileRef,
        duration_secs: u32,
    },
    Sticker {
        emoji: Option<String>,
    },
    Animation,
    Location {
        latitude: f64,
        longitude: f64,
    },
    Poll {
        question: String,
    },
    Contact {
        first_name: String,
        last_name: Option<String>,
        phone_number: String,
    },
    Other,
}

/// Discriminant of [`MessageContent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Photo,
    Video,
    Document,
    Audio,
    Voice,
    Sticker,
    Animation,
    Location,
    Poll,
    Contact,
    Other,
}

impl MessageKind {
    /// Lowercase name, also used as the base of generated media file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Sticker => "sticker",
            Self::Animation => "animation",
            Self::Location => "location",
            Self::Poll => "poll",
            Self::Contact => "contact",
            Self::Other => "other",
        }
    }

    /// Kinds whose file is downloaded into the media directory
    pub fn carries_media(&self) -> bool {
        matches!(
            self,
            Self::Photo | Self::Video | Self::Document | Self::Audio | Self::Voice
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Photo { .. } => MessageKind::Photo,
            Self::Video { .. } => MessageKind::Video,
            Self::Document { .. } => MessageKind::Document,
            Self::Audio { .. } => MessageKind::Audio,
            Self::Voice { .. } => MessageKind::Voice,
            Self::Sticker { .. } => MessageKind::Sticker,
            Self::Animation => MessageKind::Animation,
            Self::Location { .. } => MessageKind::Location,
            Self::Poll { .. } => MessageKind::Poll,
            Self::Contact { .. } => MessageKind::Contact,
            Self::Other => MessageKind::Other,
        }
    }

    /// The downloadable file for media kinds (largest size for photos)
    pub fn file(&self) -> Option<&FileRef> {
        match self {
            Self::Photo { sizes } => sizes.last(),
            Self::Video { file }
            | Self::Document { file, .. }
            | Self::Audio { file, .. }
            | Self::Voice { file, .. } => Some(file),
            _ => None,
        }
    }

    /// File name supplied by the sender, if the kind has one
    pub fn original_file_name(&self) -> Option<&str> {
        match self {
            Self::Document { file_name, .. } | Self::Audio { file_name, .. } => {
                file_name.as_deref().filter(|name| !name.is_empty())
            }
            _ => None,
        }
    }
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.content.kind()
    }

    pub fn is_voice(&self) -> bool {
        self.kind() == MessageKind::Voice
    }
}
