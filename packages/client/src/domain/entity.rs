//! Conversation and message entities held by the synchronization store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_object::{ConversationId, MessageId, UserId};

/// Kind of a message. Non-text kinds carry a structured payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    BookingRequest,
    Aftercare,
}

/// Message body: plain text, or a structured payload for non-text kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(serde_json::Value),
}

impl MessageContent {
    /// One-line rendering used by conversation previews and the terminal client.
    pub fn preview(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Structured(value) => value.to_string(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// Denormalised summary of a user, as embedded in conversations and messages.
#[derive(Debug, Clone, PartialEq)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    /// Role flag: whether this user is an artist account
    pub is_artist: bool,
}

/// A single chat message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub sender: Option<UserSummary>,
    /// Correlation id attached by the sending client, when the server echoes it
    pub client_message_id: Option<String>,
}

impl Message {
    /// Ordering key of the message list: creation time, then id for ties.
    pub fn sort_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Snapshot of the most recent message of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct LastMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    pub content: MessageContent,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            content: message.content.clone(),
            message_type: message.message_type,
            created_at: message.created_at,
        }
    }
}

/// A conversation summary as shown in the conversation list.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    pub other_user: UserSummary,
    pub last_message: Option<LastMessage>,
    pub unread_count: u32,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
