//! WebSocket frame envelope and event payloads.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Payload field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageContent, MessageType};

/// Outbound event names.
pub mod outbound {
    pub const AUTHENTICATE: &str = "authenticate";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const MARK_MESSAGES_READ: &str = "mark_messages_read";
    pub const GET_MESSAGES: &str = "get_messages";
    pub const GET_CONVERSATIONS: &str = "get_conversations";
    pub const TYPING: &str = "typing";
    pub const JOIN_CONVERSATION: &str = "join_conversation";
    pub const LEAVE_CONVERSATION: &str = "leave_conversation";
}

/// Inbound event names.
pub mod inbound {
    pub const AUTHENTICATED: &str = "authenticated";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const NEW_MESSAGE: &str = "new_message";
    pub const MESSAGE_READ: &str = "message_read";
    pub const CONVERSATION_UPDATED: &str = "conversation_updated";
    pub const CONVERSATIONS_LOADED: &str = "conversations_loaded";
    pub const MESSAGES_LOADED: &str = "messages_loaded";
    pub const USER_TYPING: &str = "user_typing";
    pub const ERROR: &str = "error";
}

/// Frame envelope shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl WireFrame {
    /// Build a frame from an event name and a serializable payload.
    pub fn new<T: Serialize>(event: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

// ========================================
// Outbound payloads
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub conversation_id: String,
    pub content: MessageContent,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

/// Payload of `mark_messages_read`, `join_conversation` and `leave_conversation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetMessagesPayload {
    pub conversation_id: String,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConversationsPayload {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    pub is_typing: bool,
}

// ========================================
// Inbound payloads
// ========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryDto {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_artist: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: MessageContent,
    #[serde(rename = "type", alias = "messageType", default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sender: Option<UserSummaryDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageDto {
    pub id: String,
    pub sender_id: String,
    pub content: MessageContent,
    #[serde(rename = "type", alias = "messageType", default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    pub id: String,
    pub other_user: UserSummaryDto,
    #[serde(default)]
    pub last_message: Option<LastMessageDto>,
    #[serde(default)]
    pub unread_count: u32,
    /// Missing for conversations without messages; falls back to `created_at`
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: String,
    pub conversation_id: String,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsLoadedPayload {
    #[serde(default)]
    pub conversations: Vec<ConversationDto>,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesLoadedPayload {
    #[serde(default)]
    pub messages: Vec<MessageDto>,
    #[serde(default = "default_success")]
    pub success: bool,
    pub conversation_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingPayload {
    pub user_id: String,
    pub conversation_id: String,
    pub is_typing: bool,
}

/// Payload of `error` and `authentication_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: String,
}
