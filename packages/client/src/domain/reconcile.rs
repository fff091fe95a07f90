//! Reconciliation rules for merging server events into local collections.
//!
//! This module contains pure functions that implement the ordering and
//! uniqueness invariants without side effects, making them easy to test.
//!
//! - Message lists are ascending by `(created_at, id)` with unique ids.
//! - Conversation lists are descending by `last_message_at`.

use std::collections::HashSet;

use super::{
    entity::{Conversation, LastMessage, Message},
    value_object::MessageId,
};

/// Sort conversations descending by `last_message_at`.
///
/// The sort is stable, so conversations with equal timestamps keep the order
/// in which the server (or previous reconciliation) placed them.
pub fn sort_conversations(conversations: &mut [Conversation]) {
    conversations.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
}

/// Sort messages ascending and drop duplicate ids, keeping the first occurrence.
pub fn normalize_messages(messages: &mut Vec<Message>) {
    let mut seen = HashSet::with_capacity(messages.len());
    messages.retain(|message| seen.insert(message.id.clone()));
    messages.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Insert a message keeping ascending order, unless its id is already present.
///
/// # Returns
///
/// `true` if the message was inserted, `false` if it was a duplicate
pub fn insert_message(messages: &mut Vec<Message>, message: Message) -> bool {
    if messages.iter().any(|existing| existing.id == message.id) {
        return false;
    }

    let position = messages.partition_point(|existing| existing.sort_key() <= message.sort_key());
    messages.insert(position, message);
    true
}

/// Flip `is_read` on the message with the given id.
///
/// # Returns
///
/// `true` if a message was found
pub fn mark_message_read(messages: &mut [Message], message_id: &MessageId) -> bool {
    match messages.iter_mut().find(|message| &message.id == message_id) {
        Some(message) => {
            message.is_read = true;
            true
        }
        None => false,
    }
}

/// Fold a new message into the summary of its conversation.
///
/// The last-message snapshot and `last_message_at` only move forward in time,
/// so a late-arriving older message never hides a newer preview. The unread
/// counter is bumped when the conversation is not the active one.
///
/// # Returns
///
/// `true` if the owning conversation is in the list
pub fn apply_message_to_conversations(
    conversations: &mut [Conversation],
    message: &Message,
    is_active: bool,
) -> bool {
    let Some(conversation) = conversations
        .iter_mut()
        .find(|conversation| conversation.id == message.conversation_id)
    else {
        return false;
    };

    if message.created_at >= conversation.last_message_at {
        conversation.last_message_at = message.created_at;
        conversation.last_message = Some(LastMessage::from(message));
    }
    if !is_active {
        conversation.unread_count = conversation.unread_count.saturating_add(1);
    }

    sort_conversations(conversations);
    true
}

/// Replace a conversation by id, or prepend it if new, then re-sort.
pub fn upsert_conversation(conversations: &mut Vec<Conversation>, conversation: Conversation) {
    match conversations
        .iter_mut()
        .find(|existing| existing.id == conversation.id)
    {
        Some(existing) => *existing = conversation,
        None => conversations.insert(0, conversation),
    }
    sort_conversations(conversations);
}
