use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use domain::{
    ActivityId, ChatMessage, ChatMessageWithSender, MessageContent, MessageId, MessageType,
    RepositoryError, UserId,
};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::broadcaster::{RoomBroadcaster, RoomEvent};
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{ChatRoomRepository, MessageRepository};
use crate::services::AdmissionService;

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub activity_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
}

pub struct ChatServiceDependencies {
    pub admission: Arc<AdmissionService>,
    pub chat_room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn RoomBroadcaster>,
}

/// 聊天用例：准入检查、持久化、再广播，顺序不可交换。
pub struct ChatService {
    deps: ChatServiceDependencies,
    /// 每个房间一把发送锁。时间戳分配、持久化和广播都在锁内完成，
    /// 投递顺序即落库顺序，两个发送方交错也不会乱序。
    send_locks: Mutex<HashMap<ActivityId, Arc<AsyncMutex<()>>>>,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self {
            deps,
            send_locks: Mutex::new(HashMap::new()),
        }
    }

    fn send_lock(&self, activity_id: ActivityId) -> Arc<AsyncMutex<()>> {
        self.send_locks
            .lock()
            .expect("send lock table poisoned")
            .entry(activity_id)
            .or_default()
            .clone()
    }

    pub async fn get_history(
        &self,
        user_id: Uuid,
        activity_id: Uuid,
        limit: Option<u32>,
        before: Option<Uuid>,
    ) -> Result<Vec<ChatMessageWithSender>, ApplicationError> {
        let user_id = UserId::from(user_id);
        let activity_id = ActivityId::from(activity_id);

        self.deps.admission.require_access(user_id, activity_id).await?;

        let room = self.deps.chat_room_repository.get_or_create(activity_id).await?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT);

        Ok(self
            .deps
            .message_repository
            .list_recent(room.id, limit, before.map(MessageId::from))
            .await?)
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<ChatMessageWithSender, ApplicationError> {
        let sender_id = UserId::from(request.sender_id);
        let activity_id = ActivityId::from(request.activity_id);

        self.deps.admission.require_access(sender_id, activity_id).await?;

        let content = MessageContent::new(request.content)?;
        let room = self.deps.chat_room_repository.get_or_create(activity_id).await?;

        let lock = self.send_lock(activity_id);
        let _slot = lock.lock().await;

        let message = ChatMessage::new(
            MessageId::from(Uuid::new_v4()),
            room.id,
            sender_id,
            content,
            request.message_type,
            self.deps.clock.now(),
        );

        let stored = self.persist_with_retry(message).await?;

        let with_sender = self
            .deps
            .message_repository
            .find_with_sender(stored.id)
            .await?
            .ok_or_else(|| RepositoryError::storage("persisted message vanished"))?;

        // 先持久化后广播：广播失败只记日志，消息始终能从历史拉到。
        let event = RoomEvent::new_message(activity_id, with_sender.clone());
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::error!(
                message_id = %stored.id,
                %activity_id,
                error = %err,
                "message persisted but live broadcast failed"
            );
        }

        Ok(with_sender)
    }

    /// 以参与者身份发一条系统消息（匹配生命周期公告）。
    pub async fn post_system_message(
        &self,
        activity_id: Uuid,
        sender_id: Uuid,
        content: String,
    ) -> Result<ChatMessageWithSender, ApplicationError> {
        self.send_message(SendMessageRequest {
            activity_id,
            sender_id,
            content,
            message_type: MessageType::System,
        })
        .await
    }

    /// 丢一条聊天消息比短暂延迟更糟，暂时性存储错误内部重试一次。
    async fn persist_with_retry(
        &self,
        message: ChatMessage,
    ) -> Result<ChatMessage, ApplicationError> {
        match self.deps.message_repository.create(message.clone()).await {
            Ok(stored) => Ok(stored),
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    message_id = %message.id,
                    error = %err,
                    "transient storage error, retrying message persist once"
                );
                Ok(self.deps.message_repository.create(message).await?)
            }
            Err(err) => Err(err.into()),
        }
    }
}
