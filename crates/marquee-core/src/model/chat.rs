//! Chat-facing DTOs exchanged with the transport collaborator.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Chat identifier assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of chat an event originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    /// One-to-one conversation with the bot.
    Private,
    /// Regular group.
    Group,
    /// Large group.
    Supergroup,
    /// Broadcast channel.
    Channel,
}

impl ChatKind {
    #[must_use]
    /// Group-type chats are the only ones the bot serves.
    pub const fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// Chat an inbound event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRef {
    /// Transport identifier.
    pub id: ChatId,
    /// Chat classification.
    pub kind: ChatKind,
    /// Title for group chats.
    pub title: Option<String>,
}

impl ChatRef {
    #[must_use]
    /// Label used in logs.
    pub fn label(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.id.to_string())
    }
}

/// Handle to a delivered message, used for later edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    /// Chat the message lives in.
    pub chat_id: ChatId,
    /// Transport message identifier.
    pub message_id: i64,
}

/// Presence indicator pushed to a chat while work is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    /// "typing…"
    Typing,
    /// "sending a file…"
    UploadDocument,
}

/// A selectable option rendered next to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionOption {
    /// Button label.
    pub label: String,
    /// Opaque token echoed back in the selection event.
    pub token: String,
}

/// Extra delivery knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    /// Options the user can pick from.
    pub selections: Vec<SelectionOption>,
    /// Files attached to the message.
    pub attachments: Vec<PathBuf>,
    /// Message this one replies to.
    pub reply_to: Option<MessageHandle>,
}

/// Text message received from a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Originating chat.
    pub chat: ChatRef,
    /// Transport message identifier.
    pub message_id: i64,
    /// Display name of the sender.
    pub sender: Option<String>,
    /// Message text.
    pub text: String,
}

impl InboundMessage {
    #[must_use]
    /// Handle pointing at this message.
    pub const fn handle(&self) -> MessageHandle {
        MessageHandle {
            chat_id: self.chat.id,
            message_id: self.message_id,
        }
    }
}

/// Events the transport pushes to the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Text message.
    Message(InboundMessage),
    /// Members joined a chat.
    MembersJoined {
        /// Chat the members joined.
        chat: ChatRef,
        /// Display names of the new members.
        members: Vec<String>,
    },
    /// A user picked a selection option.
    Selection {
        /// Chat the option was picked in.
        chat: ChatRef,
        /// Token attached to the option.
        token: String,
        /// Message carrying the option.
        message: Option<MessageHandle>,
    },
}

impl InboundEvent {
    #[must_use]
    /// Chat the event belongs to.
    pub const fn chat(&self) -> &ChatRef {
        match self {
            Self::Message(message) => &message.chat,
            Self::MembersJoined { chat, .. } | Self::Selection { chat, .. } => chat,
        }
    }
}
