//! Store configuration and the reactive snapshot published to consumers.

use std::time::Duration;

use crate::{
    connection::ConnectionState,
    domain::{Conversation, ConversationId, Message, TypingState, UserId},
    error::SyncError,
};

const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_secs(3);
const DEFAULT_PAGE_SIZE: u32 = 50;

/// Tunables of the synchronization store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a typing indicator survives without a refreshing event
    pub typing_expiry: Duration,
    /// Messages requested per history page
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            typing_expiry: DEFAULT_TYPING_EXPIRY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn with_typing_expiry(mut self, expiry: Duration) -> Self {
        self.typing_expiry = expiry;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Point-in-time view of the reconciled state.
///
/// `conversations` is always descending by `last_message_at`; `messages`
/// belongs to `active_conversation` and is ascending by creation time with
/// unique ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub conversations: Vec<Conversation>,
    pub messages: Vec<Message>,
    pub active_conversation: Option<ConversationId>,
    pub loading_conversations: bool,
    pub loading_messages: bool,
    pub error: Option<SyncError>,
    pub typing: TypingState,
    pub is_connected: bool,
    pub connection_state: ConnectionState,
}

impl StoreSnapshot {
    /// Whether any snapshot load is in flight.
    pub fn loading(&self) -> bool {
        self.loading_conversations || self.loading_messages
    }

    pub fn typing_users(&self, conversation_id: &ConversationId) -> Vec<UserId> {
        self.typing.users_in(conversation_id)
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| &conversation.id == conversation_id)
    }
}
