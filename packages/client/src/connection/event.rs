//! Typed events dispatched by the connection manager.

use std::fmt;

use super::manager::ConnectionState;
use crate::{
    domain::{Conversation, ConversationId, Message, MessageId, UserId},
    infrastructure::{
        dto::{
            DtoError,
            conversion::convert_all,
            websocket::{self as dto, WireFrame, inbound},
        },
        transport::DisconnectReason,
    },
};

/// Names of the events a subscriber can listen to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    /// Any change of [`ConnectionState`], including silent ones
    StateChanged,
    Authenticated,
    AuthenticationError,
    NewMessage,
    MessageRead,
    ConversationUpdated,
    ConversationsLoaded,
    MessagesLoaded,
    UserTyping,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        EventKind::Connect,
        EventKind::Disconnect,
        EventKind::StateChanged,
        EventKind::Authenticated,
        EventKind::AuthenticationError,
        EventKind::NewMessage,
        EventKind::MessageRead,
        EventKind::ConversationUpdated,
        EventKind::ConversationsLoaded,
        EventKind::MessagesLoaded,
        EventKind::UserTyping,
        EventKind::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
            EventKind::StateChanged => "state_changed",
            EventKind::Authenticated => inbound::AUTHENTICATED,
            EventKind::AuthenticationError => inbound::AUTHENTICATION_ERROR,
            EventKind::NewMessage => inbound::NEW_MESSAGE,
            EventKind::MessageRead => inbound::MESSAGE_READ,
            EventKind::ConversationUpdated => inbound::CONVERSATION_UPDATED,
            EventKind::ConversationsLoaded => inbound::CONVERSATIONS_LOADED,
            EventKind::MessagesLoaded => inbound::MESSAGES_LOADED,
            EventKind::UserTyping => inbound::USER_TYPING,
            EventKind::Error => inbound::ERROR,
        }
    }

    /// Look up an event by its name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event re-emitted uniformly by the connection manager.
///
/// `Connect`, `Disconnect` and `StateChanged` originate from the manager;
/// every other variant is decoded from a server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connect,
    Disconnect {
        reason: DisconnectReason,
    },
    StateChanged {
        state: ConnectionState,
    },
    Authenticated {
        data: serde_json::Value,
    },
    AuthenticationError {
        message: String,
    },
    NewMessage(Message),
    MessageRead {
        message_id: MessageId,
        conversation_id: ConversationId,
    },
    ConversationUpdated(Conversation),
    ConversationsLoaded {
        conversations: Vec<Conversation>,
        success: bool,
        message: Option<String>,
    },
    MessagesLoaded {
        conversation_id: ConversationId,
        messages: Vec<Message>,
        success: bool,
        message: Option<String>,
    },
    UserTyping {
        user_id: UserId,
        conversation_id: ConversationId,
        is_typing: bool,
    },
    Error {
        message: String,
    },
}

impl ConnectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectionEvent::Connect => EventKind::Connect,
            ConnectionEvent::Disconnect { .. } => EventKind::Disconnect,
            ConnectionEvent::StateChanged { .. } => EventKind::StateChanged,
            ConnectionEvent::Authenticated { .. } => EventKind::Authenticated,
            ConnectionEvent::AuthenticationError { .. } => EventKind::AuthenticationError,
            ConnectionEvent::NewMessage(_) => EventKind::NewMessage,
            ConnectionEvent::MessageRead { .. } => EventKind::MessageRead,
            ConnectionEvent::ConversationUpdated(_) => EventKind::ConversationUpdated,
            ConnectionEvent::ConversationsLoaded { .. } => EventKind::ConversationsLoaded,
            ConnectionEvent::MessagesLoaded { .. } => EventKind::MessagesLoaded,
            ConnectionEvent::UserTyping { .. } => EventKind::UserTyping,
            ConnectionEvent::Error { .. } => EventKind::Error,
        }
    }

    /// Decode a server frame.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(event))` - a known server event
    /// * `Ok(None)` - an event name this engine does not handle
    /// * `Err(DtoError)` - a known event with a malformed payload
    pub fn decode(frame: WireFrame) -> Result<Option<Self>, DtoError> {
        let Some(kind) = EventKind::from_name(&frame.event) else {
            return Ok(None);
        };
        let data = frame.data;

        let event = match kind {
            // Lifecycle events never come from the server.
            EventKind::Connect | EventKind::Disconnect | EventKind::StateChanged => {
                return Ok(None);
            }
            EventKind::Authenticated => ConnectionEvent::Authenticated { data },
            EventKind::AuthenticationError => {
                let payload: dto::ErrorPayload = serde_json::from_value(data)?;
                ConnectionEvent::AuthenticationError {
                    message: payload.message,
                }
            }
            EventKind::NewMessage => {
                let payload: dto::MessageDto = serde_json::from_value(data)?;
                ConnectionEvent::NewMessage(Message::try_from(payload)?)
            }
            EventKind::MessageRead => {
                let payload: dto::MessageReadPayload = serde_json::from_value(data)?;
                ConnectionEvent::MessageRead {
                    message_id: MessageId::new(payload.message_id)?,
                    conversation_id: ConversationId::new(payload.conversation_id)?,
                }
            }
            EventKind::ConversationUpdated => {
                let payload: dto::ConversationDto = serde_json::from_value(data)?;
                ConnectionEvent::ConversationUpdated(Conversation::try_from(payload)?)
            }
            EventKind::ConversationsLoaded => {
                let payload: dto::ConversationsLoadedPayload = serde_json::from_value(data)?;
                ConnectionEvent::ConversationsLoaded {
                    conversations: convert_all(payload.conversations)?,
                    success: payload.success,
                    message: payload.message,
                }
            }
            EventKind::MessagesLoaded => {
                let payload: dto::MessagesLoadedPayload = serde_json::from_value(data)?;
                ConnectionEvent::MessagesLoaded {
                    conversation_id: ConversationId::new(payload.conversation_id)?,
                    messages: convert_all(payload.messages)?,
                    success: payload.success,
                    message: payload.message,
                }
            }
            EventKind::UserTyping => {
                let payload: dto::UserTypingPayload = serde_json::from_value(data)?;
                ConnectionEvent::UserTyping {
                    user_id: UserId::new(payload.user_id)?,
                    conversation_id: ConversationId::new(payload.conversation_id)?,
                    is_typing: payload.is_typing,
                }
            }
            EventKind::Error => {
                let payload: dto::ErrorPayload = serde_json::from_value(data)?;
                ConnectionEvent::Error {
                    message: payload.message,
                }
            }
        };

        Ok(Some(event))
    }
}
