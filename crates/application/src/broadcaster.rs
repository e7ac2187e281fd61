use async_trait::async_trait;
use domain::{ActivityId, ActivityMatch, ChatMessageWithSender, UserSummary};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 推送到某个活动房间的事件。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent {
    pub activity_id: ActivityId,
    pub payload: RoomEventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomEventPayload {
    NewMessage {
        message: ChatMessageWithSender,
    },
    NewMatch {
        match_record: ActivityMatch,
        user: UserSummary,
    },
    MatchUpdated {
        match_record: ActivityMatch,
    },
}

impl RoomEvent {
    pub fn new_message(activity_id: ActivityId, message: ChatMessageWithSender) -> Self {
        Self {
            activity_id,
            payload: RoomEventPayload::NewMessage { message },
        }
    }

    pub fn new_match(activity_id: ActivityId, match_record: ActivityMatch, user: UserSummary) -> Self {
        Self {
            activity_id,
            payload: RoomEventPayload::NewMatch { match_record, user },
        }
    }

    pub fn match_updated(activity_id: ActivityId, match_record: ActivityMatch) -> Self {
        Self {
            activity_id,
            payload: RoomEventPayload::MatchUpdated { match_record },
        }
    }
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 先持久化、后广播。实现方对单个慢连接不得阻塞整个房间。
#[async_trait]
pub trait RoomBroadcaster: Send + Sync {
    async fn broadcast(&self, event: RoomEvent) -> Result<(), BroadcastError>;
}
