//! 房间注册表：活动 id 到当前在线连接集合的映射。
//!
//! 进程启动时构造一次，通过 Arc 传给网关，绝不做成全局静态。
//! 成员表是核心里唯一的跨任务可变结构，所有变更都经过同一把锁。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use domain::{ActivityId, UserId};
use tokio::sync::mpsc;

use crate::broadcaster::{BroadcastError, RoomBroadcaster, RoomEvent};
use crate::error::ApplicationError;
use crate::services::AdmissionService;

/// 运行期连接标识，不持久化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// join 成功后的订阅句柄。连接任务退出前必须调用 leave 注销。
pub struct RoomSubscription {
    pub connection_id: ConnectionId,
    pub events: mpsc::Receiver<RoomEvent>,
}

struct Room {
    connections: HashMap<ConnectionId, mpsc::Sender<RoomEvent>>,
}

pub struct ChatRoomRegistry {
    admission: Arc<AdmissionService>,
    rooms: Mutex<HashMap<ActivityId, Room>>,
    next_connection: AtomicU64,
    send_queue_capacity: usize,
    dropped_deliveries: AtomicU64,
}

impl ChatRoomRegistry {
    pub fn new(admission: Arc<AdmissionService>, send_queue_capacity: usize) -> Self {
        Self {
            admission,
            rooms: Mutex::new(HashMap::new()),
            next_connection: AtomicU64::new(1),
            send_queue_capacity: send_queue_capacity.max(1),
            dropped_deliveries: AtomicU64::new(0),
        }
    }

    /// 加入房间。准入检查失败时不做任何注册。
    pub async fn join(
        &self,
        activity_id: ActivityId,
        user_id: UserId,
    ) -> Result<RoomSubscription, ApplicationError> {
        self.admission.require_access(user_id, activity_id).await?;

        let connection_id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.send_queue_capacity);

        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        rooms
            .entry(activity_id)
            .or_insert_with(|| Room {
                connections: HashMap::new(),
            })
            .connections
            .insert(connection_id, sender);
        drop(rooms);

        tracing::debug!(%activity_id, %user_id, %connection_id, "connection joined room");

        Ok(RoomSubscription {
            connection_id,
            events: receiver,
        })
    }

    /// 注销连接。最后一个连接离开时整个房间条目被移除，
    /// 注册表的内存不会随连接来来去去而增长。
    pub fn leave(&self, activity_id: ActivityId, connection_id: ConnectionId) {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        if let Some(room) = rooms.get_mut(&activity_id) {
            room.connections.remove(&connection_id);
            if room.connections.is_empty() {
                rooms.remove(&activity_id);
            }
        }
        tracing::debug!(%activity_id, %connection_id, "connection left room");
    }

    /// 把一条已持久化的事件投递给房间里的每个连接。
    /// 单个写满或已关闭的队列只丢弃那一份投递并计数，不影响其他连接。
    pub fn publish(&self, activity_id: ActivityId, event: RoomEvent) {
        let rooms = self.rooms.lock().expect("registry lock poisoned");
        let Some(room) = rooms.get(&activity_id) else {
            tracing::debug!(%activity_id, "publish to empty room");
            return;
        };

        for (connection_id, sender) in &room.connections {
            if let Err(err) = sender.try_send(event.clone()) {
                self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    %activity_id,
                    %connection_id,
                    error = %err,
                    "dropped delivery to backpressured connection"
                );
            }
        }
    }

    pub fn room_size(&self, activity_id: ActivityId) -> usize {
        self.rooms
            .lock()
            .expect("registry lock poisoned")
            .get(&activity_id)
            .map(|room| room.connections.len())
            .unwrap_or(0)
    }

    /// 房间条目是否仍在注册表里（空房间会被移除）。
    pub fn has_room(&self, activity_id: ActivityId) -> bool {
        self.rooms
            .lock()
            .expect("registry lock poisoned")
            .contains_key(&activity_id)
    }

    pub fn dropped_deliveries(&self) -> u64 {
        self.dropped_deliveries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RoomBroadcaster for ChatRoomRegistry {
    async fn broadcast(&self, event: RoomEvent) -> Result<(), BroadcastError> {
        self.publish(event.activity_id, event.clone());
        Ok(())
    }
}
