//! WebSocket 连接管理器。
//!
//! 封装单个连接的生命周期：进入房间、转发房间事件、
//! 处理客户端帧、断开时注销连接。

use axum::extract::ws::{Message as WsMessage, WebSocket};
use uuid::Uuid;

use application::{
    ApplicationError, RoomEvent, RoomSubscription, SendMessageRequest,
};
use domain::{ActivityId, MessageType, UserId};

use crate::protocol::{ClientFrame, ServerFrame};
use crate::state::AppState;

/// 当前加入的房间。同一连接同一时刻只在一个房间里，
/// 切换房间时先注销旧的订阅。
struct JoinedRoom {
    activity_id: ActivityId,
    subscription: RoomSubscription,
}

pub struct WsConnection {
    state: AppState,
    user_id: UserId,
    room: Option<JoinedRoom>,
}

impl WsConnection {
    pub fn new(state: AppState, user_id: Uuid) -> Self {
        Self {
            state,
            user_id: UserId::from(user_id),
            room: None,
        }
    }

    pub async fn run(mut self, mut socket: WebSocket) {
        tracing::info!(user_id = %self.user_id, "websocket connection established");

        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(message)) => {
                            if self.handle_incoming(message, &mut socket).await.is_err() {
                                break;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::debug!(user_id = %self.user_id, error = %err, "websocket read error");
                            break;
                        }
                        None => break,
                    }
                }
                event = Self::next_event(&mut self.room) => {
                    let Some(event) = event else {
                        // 订阅通道被关闭，当作退出房间处理。
                        self.leave_current_room();
                        continue;
                    };
                    if Self::send_frame(&mut socket, ServerFrame::from(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.leave_current_room();
        tracing::info!(user_id = %self.user_id, "websocket connection closed");
    }

    /// 没有加入房间时挂起，让 select 只等客户端帧。
    async fn next_event(room: &mut Option<JoinedRoom>) -> Option<RoomEvent> {
        match room {
            Some(joined) => joined.subscription.events.recv().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_incoming(
        &mut self,
        message: WsMessage,
        socket: &mut WebSocket,
    ) -> Result<(), ()> {
        let text = match message {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => return Err(()),
            // Ping/Pong 由底层协议栈应答。
            _ => return Ok(()),
        };

        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::debug!(user_id = %self.user_id, error = %err, "malformed client frame");
                return Self::send_frame(socket, ServerFrame::error("malformed frame")).await;
            }
        };

        match frame {
            ClientFrame::JoinActivity {
                activity_id,
                user_id,
            } => {
                if user_id.is_some_and(|claimed| UserId::from(claimed) != self.user_id) {
                    return Self::send_frame(socket, ServerFrame::error("identity mismatch"))
                        .await;
                }
                self.join_activity(ActivityId::from(activity_id), socket).await
            }
            ClientFrame::SendMessage {
                activity_id,
                message,
                message_type,
            } => {
                self.send_message(ActivityId::from(activity_id), message, message_type, socket)
                    .await
            }
        }
    }

    async fn join_activity(
        &mut self,
        activity_id: ActivityId,
        socket: &mut WebSocket,
    ) -> Result<(), ()> {
        match self.state.registry.join(activity_id, self.user_id).await {
            Ok(subscription) => {
                // 准入通过后才放弃旧房间。
                self.leave_current_room();
                self.room = Some(JoinedRoom {
                    activity_id,
                    subscription,
                });
                Self::send_frame(
                    socket,
                    ServerFrame::JoinedActivity {
                        activity_id: activity_id.into(),
                    },
                )
                .await
            }
            Err(err) => {
                tracing::debug!(
                    user_id = %self.user_id,
                    %activity_id,
                    error = %err,
                    "join rejected"
                );
                Self::send_frame(socket, ServerFrame::error(Self::client_message(&err))).await
            }
        }
    }

    async fn send_message(
        &mut self,
        activity_id: ActivityId,
        message: String,
        message_type: Option<MessageType>,
        socket: &mut WebSocket,
    ) -> Result<(), ()> {
        // 只接受发往当前已加入房间的消息。
        let Some(joined) = &self.room else {
            return Self::send_frame(socket, ServerFrame::error("join an activity first")).await;
        };
        if joined.activity_id != activity_id {
            return Self::send_frame(socket, ServerFrame::error("not joined to this activity"))
                .await;
        }

        let request = SendMessageRequest {
            activity_id: activity_id.into(),
            sender_id: self.user_id.into(),
            content: message,
            message_type: message_type.unwrap_or(MessageType::Text),
        };

        // 成功的消息经由注册表回流到本连接的订阅，这里不用回显。
        if let Err(err) = self.state.chat_service.send_message(request).await {
            tracing::debug!(user_id = %self.user_id, error = %err, "send_message rejected");
            return Self::send_frame(socket, ServerFrame::error(Self::client_message(&err))).await;
        }

        Ok(())
    }

    fn leave_current_room(&mut self) {
        if let Some(joined) = self.room.take() {
            self.state
                .registry
                .leave(joined.activity_id, joined.subscription.connection_id);
        }
    }

    /// 面向客户端的错误文案，存储细节不外泄。
    fn client_message(err: &ApplicationError) -> String {
        match err {
            ApplicationError::Domain(domain_err) => domain_err.to_string(),
            ApplicationError::Repository(_) | ApplicationError::Broadcast(_) => {
                "internal error".to_owned()
            }
        }
    }

    async fn send_frame(socket: &mut WebSocket, frame: ServerFrame) -> Result<(), ()> {
        let payload = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize websocket payload");
                return Ok(());
            }
        };
        socket
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|_| ())
    }
}
