//! Ephemeral typing presence, keyed by conversation.
//!
//! Expiry timers are owned by the store; this type only tracks membership.

use std::collections::{BTreeSet, HashMap};

use super::value_object::{ConversationId, UserId};

/// Users currently typing, per conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingState {
    users: HashMap<ConversationId, BTreeSet<UserId>>,
}

impl TypingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a user as typing. Returns `true` if the user was not already present.
    pub fn start(&mut self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.users.entry(conversation_id).or_default().insert(user_id)
    }

    /// Remove a user from a conversation's typing set. Empty sets are dropped.
    pub fn stop(&mut self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        let Some(users) = self.users.get_mut(conversation_id) else {
            return false;
        };
        let removed = users.remove(user_id);
        if users.is_empty() {
            self.users.remove(conversation_id);
        }
        removed
    }

    /// Users typing in a conversation, in id order.
    pub fn users_in(&self, conversation_id: &ConversationId) -> Vec<UserId> {
        self.users
            .get(conversation_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_typing(&self, conversation_id: &ConversationId, user_id: &UserId) -> bool {
        self.users
            .get(conversation_id)
            .is_some_and(|users| users.contains(user_id))
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
