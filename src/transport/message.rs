use serde::{Deserialize, Serialize};

use crate::broker::message::{ChatId, ConnectionId, UserId};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame on a connection.
    Hello { user_id: UserId },
    Send {
        chat_id: ChatId,
        text: String,
        #[serde(default)]
        attachment_id: Option<String>,
    },
    Invite { chat_id: ChatId, user_id: UserId },
}

/// Direct replies. Chat traffic is sent as `OutboundEvent`, whose tags
/// (`message`, `chat_joined`) do not overlap with these.
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready {
        connection_id: ConnectionId,
        chats: Vec<ChatId>,
    },
    Invited { chat_id: ChatId, user_id: UserId },
    Error { message: String, retryable: bool },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            retryable: false,
        }
    }
}
