//! # Channel Events
//!
//! Types that flow over a messaging session: dialogs, destinations and the
//! messages observed on them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier the channel assigns to every message it carries.
///
/// The token of an outbound command is what a reply points back to through
/// [`InboundReply::in_reply_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageToken(pub i64);

impl fmt::Display for MessageToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a conversation (user chat, group or channel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(pub i64);

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of conversation a dialog represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    /// One-to-one conversation.
    User,
    /// Group chat.
    Group,
    /// Broadcast channel.
    Channel,
}

/// A conversation as listed by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogInfo {
    /// Conversation identifier.
    pub id: DestinationId,
    /// Display name.
    pub name: String,
    /// Conversation kind.
    pub kind: DialogKind,
    /// Whether the user pinned this dialog.
    pub pinned: bool,
}

impl DialogInfo {
    /// Create an unpinned dialog.
    pub fn new(id: i64, name: impl Into<String>, kind: DialogKind) -> Self {
        Self {
            id: DestinationId(id),
            name: name.into(),
            kind,
            pinned: false,
        }
    }

    /// Mark the dialog as pinned.
    #[must_use]
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// True for group chats.
    pub fn is_group(&self) -> bool {
        self.kind == DialogKind::Group
    }

    /// True for broadcast channels.
    pub fn is_channel(&self) -> bool {
        self.kind == DialogKind::Channel
    }
}

/// The resolved conversation that commands are sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// Conversation identifier.
    pub id: DestinationId,
    /// Display name (for logging).
    pub name: String,
    /// Conversation kind.
    pub kind: DialogKind,
}

impl From<&DialogInfo> for Destination {
    fn from(dialog: &DialogInfo) -> Self {
        Self {
            id: dialog.id,
            name: dialog.name.clone(),
            kind: dialog.kind,
        }
    }
}

/// Content of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    /// Inline text.
    Text {
        /// Message text.
        text: String,
    },
    /// Attached document; content must be downloaded separately.
    File {
        /// Original file name.
        file_name: String,
        /// Size in bytes.
        size: u64,
    },
}

impl MessageBody {
    /// Build a text body.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Inline text, if this is a text body.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::File { .. } => None,
        }
    }

    /// True for document attachments.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// True when there is nothing a reader could consume: blank text.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text { text } => text.trim().is_empty(),
            Self::File { .. } => false,
        }
    }
}

/// A message observed on a destination.
///
/// Outgoing messages (sent by this session) are delivered to subscribers as
/// well; consumers that only care about replies filter on `outgoing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundReply {
    /// Token of this message.
    pub message_id: MessageToken,
    /// Conversation the message was posted in.
    pub destination: DestinationId,
    /// Display name of the author.
    pub sender: String,
    /// True when this session authored the message.
    pub outgoing: bool,
    /// Token of the message this one replies to.
    pub in_reply_to: Option<MessageToken>,
    /// Message content.
    pub body: MessageBody,
}

impl InboundReply {
    /// True if this message replies to `token`.
    pub fn replies_to(&self, token: MessageToken) -> bool {
        self.in_reply_to == Some(token)
    }
}
