//! WebSocket 线上协议。
//!
//! 帧是带 `type` 标签的 JSON 对象。未知或畸形的帧不会断开连接，
//! 网关回一个 error 帧后继续服务。

use application::{RoomEvent, RoomEventPayload};
use domain::{ActivityMatch, ChatMessageWithSender, MessageType, UserSummary};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 客户端到服务器的帧。
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    JoinActivity {
        activity_id: Uuid,
        /// 部署的客户端仍在帧里带身份，必须与连接身份一致。
        #[serde(default)]
        user_id: Option<Uuid>,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        activity_id: Uuid,
        message: String,
        #[serde(default)]
        message_type: Option<MessageType>,
    },
}

/// 服务器到客户端的帧。
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    JoinedActivity { activity_id: Uuid },
    NewMessage {
        message: ChatMessageWithSender,
    },
    NewMatch {
        #[serde(rename = "match")]
        match_record: ActivityMatch,
        user: UserSummary,
    },
    MatchUpdated {
        #[serde(rename = "match")]
        match_record: ActivityMatch,
    },
    Error {
        message: String,
    },
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

impl From<RoomEvent> for ServerFrame {
    fn from(event: RoomEvent) -> Self {
        match event.payload {
            RoomEventPayload::NewMessage { message } => Self::NewMessage { message },
            RoomEventPayload::NewMatch { match_record, user } => {
                Self::NewMatch { match_record, user }
            }
            RoomEventPayload::MatchUpdated { match_record } => Self::MatchUpdated { match_record },
        }
    }
}
