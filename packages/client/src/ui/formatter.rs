//! Message formatting utilities for terminal display.

use chatsync_shared::time::{to_display_clock, to_display_rfc3339};

use crate::{
    connection::ConnectionState,
    domain::{Conversation, ConversationId, Message, UserId},
    error::SyncError,
};

const RULE: &str = "============================================================";
const THIN_RULE: &str = "------------------------------------------------------------";

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the conversation list, marking the active conversation
    ///
    /// # Arguments
    ///
    /// * `conversations` - Conversations in display order
    /// * `active` - The conversation currently in view, if any
    pub fn format_conversation_list(
        conversations: &[Conversation],
        active: Option<&ConversationId>,
    ) -> String {
        let mut output = String::new();
        output.push_str(&format!("\n\n{}\n", RULE));
        output.push_str("Conversations:\n");

        if conversations.is_empty() {
            output.push_str("(No conversations)\n");
        } else {
            for conversation in conversations {
                let marker = if Some(&conversation.id) == active { "*" } else { " " };
                let unread = if conversation.unread_count > 0 {
                    format!(" [{} unread]", conversation.unread_count)
                } else {
                    String::new()
                };
                let preview = conversation
                    .last_message
                    .as_ref()
                    .map(|last| last.content.preview())
                    .unwrap_or_default();
                output.push_str(&format!(
                    "{} {} with {}{} - {} (last at {})\n",
                    marker,
                    conversation.id,
                    conversation.other_user.name,
                    unread,
                    preview,
                    to_display_rfc3339(&conversation.last_message_at)
                ));
            }
        }

        output.push_str(RULE);
        output.push('\n');
        output
    }

    /// Format a chat message
    ///
    /// # Arguments
    ///
    /// * `message` - The reconciled message
    /// * `current_user` - Used to mark the user's own messages
    pub fn format_message(message: &Message, current_user: &UserId) -> String {
        let sender = message
            .sender
            .as_ref()
            .map(|sender| sender.name.as_str())
            .unwrap_or(message.sender_id.as_str());
        let me_suffix = if &message.sender_id == current_user {
            " (me)"
        } else {
            ""
        };
        format!(
            "\n{}\n[{}] @{}{}: {}\n{}\n",
            THIN_RULE,
            to_display_clock(&message.created_at),
            sender,
            me_suffix,
            message.content.preview(),
            THIN_RULE
        )
    }

    /// Format the typing notice for a conversation. `None` when nobody types.
    pub fn format_typing(users: &[UserId]) -> Option<String> {
        match users {
            [] => None,
            [user] => Some(format!("\n... {} is typing\n", user)),
            users => {
                let names: Vec<&str> = users.iter().map(UserId::as_str).collect();
                Some(format!("\n... {} are typing\n", names.join(", ")))
            }
        }
    }

    pub fn format_connection_state(state: ConnectionState) -> String {
        let label = match state {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        format!("\n# {}\n", label)
    }

    pub fn format_error(error: &SyncError) -> String {
        format!("\n! {}\n", error)
    }

    /// Format a confirmation after a send was queued
    pub fn format_sent_confirmation(client_message_id: &str) -> String {
        format!("queued ({})\n", client_message_id)
    }
}
