use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::user::UserSummary;
use crate::value_objects::{ActivityId, ChatRoomId, MessageContent, MessageId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::System => "system",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "system" => Ok(Self::System),
            other => Err(DomainError::invalid_argument("message_type", other)),
        }
    }
}

/// 每个活动一个聊天室，首次访问时懒创建。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    pub id: ChatRoomId,
    pub activity_id: ActivityId,
    pub created_at: Timestamp,
}

/// 聊天消息。只追加，按 (created_at, id) 排序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub chat_room_id: ChatRoomId,
    pub sender_id: UserId,
    /// 线上字段名是 message，沿用客户端既有的协议。
    #[serde(rename = "message")]
    pub content: MessageContent,
    pub message_type: MessageType,
    pub created_at: Timestamp,
}

impl ChatMessage {
    pub fn new(
        id: MessageId,
        chat_room_id: ChatRoomId,
        sender_id: UserId,
        content: MessageContent,
        message_type: MessageType,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            chat_room_id,
            sender_id,
            content,
            message_type,
            created_at,
        }
    }
}

/// 带发送者摘要的消息，历史查询和实时推送都用这个形态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageWithSender {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub sender: UserSummary,
}
