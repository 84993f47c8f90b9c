//! Event definitions for the distribution core
//!
//! `MessageEvent` is the immutable value fanned out to every listener of a
//! chat. It is cloned per delivery; listeners never share mutable state.
//!
//! `OutboundEvent` is what a connection's merged queue carries: chat messages
//! plus the join preview published by `subscribe_users_on_chat`. It is
//! serialized with a `type` tag so transports can forward it as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ChatId = String;
pub type ConnectionId = String;
pub type UserId = String;
pub type MessageId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_id: String,
    /// Empty when the storage backend could not resolve `file_id`.
    pub url: String,
}

/// A message as submitted by a transport, before sender metadata is stamped.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub kind: MessageKind,
    pub attachment_id: Option<String>,
}

impl NewMessage {
    pub fn text(chat_id: impl Into<ChatId>, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            text: text.into(),
            kind: MessageKind::User,
            attachment_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: Option<UserId>,
    pub sender_name: Option<String>,
    pub sender_avatar_url: Option<String>,
    pub text: String,
    pub kind: MessageKind,
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short history shown to a connection right after it joins a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPreview {
    pub chat_id: ChatId,
    pub name: String,
    pub last_messages: Vec<MessageEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    Message(MessageEvent),
    ChatJoined(ChatPreview),
}

impl OutboundEvent {
    pub fn chat_id(&self) -> &str {
        match self {
            OutboundEvent::Message(m) => &m.chat_id,
            OutboundEvent::ChatJoined(p) => &p.chat_id,
        }
    }
}
