use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Inbound events, client to server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "authenticate")]
    Authenticate { token: String },
    #[serde(rename = "private_message")]
    PrivateMessage {
        to: Uuid,
        message: String,
        #[serde(default)]
        media: Vec<String>,
    },
    #[serde(rename = "typing")]
    Typing { conversation_id: Uuid },
    #[serde(rename = "stop_typing")]
    StopTyping { conversation_id: Uuid },
    #[serde(rename = "react_to_message")]
    ReactToMessage {
        conversation_id: Uuid,
        message_id: Uuid,
        reaction: String,
    },
    #[serde(rename = "mark_as_read")]
    MarkAsRead { conversation_id: Uuid },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticate { .. } => "authenticate",
            Self::PrivateMessage { .. } => "private_message",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stop_typing",
            Self::ReactToMessage { .. } => "react_to_message",
            Self::MarkAsRead { .. } => "mark_as_read",
        }
    }
}

/// Outbound events, server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "authenticated")]
    Authenticated { user_id: Uuid },
    #[serde(rename = "authentication_error")]
    AuthenticationError { message: String },
    #[serde(rename = "message_sent")]
    MessageSent { message: Message },
    #[serde(rename = "new_message")]
    NewMessage {
        sender_id: Uuid,
        conversation_id: Uuid,
        message: Message,
    },
    #[serde(rename = "message_error")]
    MessageError { message: String },
    #[serde(rename = "user_online")]
    UserOnline { user_id: Uuid },
    #[serde(rename = "user_offline")]
    UserOffline { user_id: Uuid },
    #[serde(rename = "user_typing")]
    UserTyping {
        user_id: Uuid,
        conversation_id: Uuid,
    },
    #[serde(rename = "user_stop_typing")]
    UserStopTyping {
        user_id: Uuid,
        conversation_id: Uuid,
    },
    #[serde(rename = "message_reacted")]
    MessageReacted {
        conversation_id: Uuid,
        message_id: Uuid,
        reacted_by: Uuid,
        reaction: String,
    },
    #[serde(rename = "messages_read")]
    MessagesRead {
        conversation_id: Uuid,
        read_by: Uuid,
    },
    #[serde(rename = "unread_messages_count")]
    UnreadMessagesCount { count: i64 },
    #[serde(rename = "reaction_error")]
    ReactionError { message: String },
    #[serde(rename = "read_error")]
    ReadError { message: String },
}
