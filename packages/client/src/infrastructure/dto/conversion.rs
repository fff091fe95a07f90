//! Conversion logic between DTOs and domain entities.

use thiserror::Error;

use crate::domain::{
    ConversationId, MessageId, UserId, ValueObjectError,
    entity::{Conversation, LastMessage, Message, UserSummary},
};
use crate::infrastructure::dto::websocket as dto;

/// Errors raised while decoding an inbound payload.
#[derive(Debug, Error)]
pub enum DtoError {
    /// The payload did not match the expected shape
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field held a value the domain rejects
    #[error("Invalid payload value: {0}")]
    Invalid(#[from] ValueObjectError),
}

// ========================================
// DTO → Domain Entity
// ========================================

impl TryFrom<dto::UserSummaryDto> for UserSummary {
    type Error = DtoError;

    fn try_from(dto: dto::UserSummaryDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: UserId::new(dto.id)?,
            name: dto.name,
            avatar: dto.avatar,
            is_artist: dto.is_artist,
        })
    }
}

impl TryFrom<dto::MessageDto> for Message {
    type Error = DtoError;

    fn try_from(dto: dto::MessageDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: MessageId::new(dto.id)?,
            conversation_id: ConversationId::new(dto.conversation_id)?,
            sender_id: UserId::new(dto.sender_id)?,
            receiver_id: UserId::new(dto.receiver_id)?,
            content: dto.content,
            message_type: dto.message_type,
            is_read: dto.is_read,
            created_at: dto.created_at,
            sender: dto.sender.map(UserSummary::try_from).transpose()?,
            client_message_id: dto.client_message_id,
        })
    }
}

impl TryFrom<dto::LastMessageDto> for LastMessage {
    type Error = DtoError;

    fn try_from(dto: dto::LastMessageDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: MessageId::new(dto.id)?,
            sender_id: UserId::new(dto.sender_id)?,
            content: dto.content,
            message_type: dto.message_type,
            created_at: dto.created_at,
        })
    }
}

impl TryFrom<dto::ConversationDto> for Conversation {
    type Error = DtoError;

    fn try_from(dto: dto::ConversationDto) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ConversationId::new(dto.id)?,
            other_user: UserSummary::try_from(dto.other_user)?,
            last_message: dto.last_message.map(LastMessage::try_from).transpose()?,
            unread_count: dto.unread_count,
            last_message_at: dto.last_message_at.unwrap_or(dto.created_at),
            created_at: dto.created_at,
        })
    }
}

/// Convert a batch of DTOs, failing on the first invalid entry.
pub fn convert_all<D, E>(items: Vec<D>) -> Result<Vec<E>, DtoError>
where
    E: TryFrom<D, Error = DtoError>,
{
    items.into_iter().map(E::try_from).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::domain::{MessageContent, MessageType};

    fn user_dto(id: &str) -> dto::UserSummaryDto {
        dto::UserSummaryDto {
            id: id.to_string(),
            name: "Bob".to_string(),
            avatar: Some("https://cdn.example/bob.png".to_string()),
            is_artist: true,
        }
    }

    #[test]
    fn test_dto_message_to_domain() {
        // テスト項目: DTO の MessageDto がドメインエンティティに変換される
        // given (前提条件):
        let created_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let dto_msg = dto::MessageDto {
            id: "m1".to_string(),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            content: MessageContent::Text("Hello!".to_string()),
            message_type: MessageType::Text,
            is_read: false,
            created_at,
            sender: Some(user_dto("u1")),
            client_message_id: Some("corr-1".to_string()),
        };

        // when (操作):
        let message = Message::try_from(dto_msg).unwrap();

        // then (期待する結果):
        assert_eq!(message.id, MessageId::new("m1").unwrap());
        assert_eq!(message.conversation_id, ConversationId::new("c1").unwrap());
        assert_eq!(message.created_at, created_at);
        assert_eq!(message.sender.unwrap().name, "Bob");
        assert_eq!(message.client_message_id.as_deref(), Some("corr-1"));
    }

    #[test]
    fn test_dto_message_with_empty_id_is_rejected() {
        // テスト項目: 空の ID を持つメッセージは変換に失敗する
        // given (前提条件):
        let dto_msg = dto::MessageDto {
            id: String::new(),
            conversation_id: "c1".to_string(),
            sender_id: "u1".to_string(),
            receiver_id: "u2".to_string(),
            content: MessageContent::Text("Hello!".to_string()),
            message_type: MessageType::Text,
            is_read: false,
            created_at: Utc::now(),
            sender: None,
            client_message_id: None,
        };

        // when (操作):
        let result = Message::try_from(dto_msg);

        // then (期待する結果):
        assert!(matches!(result, Err(DtoError::Invalid(_))));
    }

    #[test]
    fn test_dto_conversation_without_last_message_at_uses_created_at() {
        // テスト項目: lastMessageAt が無い会話は作成時刻で並べ替えられる
        // given (前提条件):
        let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let dto_conv = dto::ConversationDto {
            id: "c1".to_string(),
            other_user: user_dto("u2"),
            last_message: None,
            unread_count: 3,
            last_message_at: None,
            created_at,
        };

        // when (操作):
        let conversation = Conversation::try_from(dto_conv).unwrap();

        // then (期待する結果):
        assert_eq!(conversation.last_message_at, created_at);
        assert_eq!(conversation.unread_count, 3);
        assert!(conversation.other_user.is_artist);
    }
}
