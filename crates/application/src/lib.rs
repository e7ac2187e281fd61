//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务：滑动到匹配/申请的状态转换、
//! 聊天准入判定、消息持久化与广播，以及房间注册表的连接管理。

pub mod broadcaster;
pub mod clock;
pub mod error;
pub mod registry;
pub mod repository;
pub mod services;

pub use broadcaster::{BroadcastError, RoomBroadcaster, RoomEvent, RoomEventPayload};
pub use clock::{Clock, SystemClock};
pub use error::ApplicationError;
pub use registry::{ChatRoomRegistry, ConnectionId, RoomSubscription};
pub use repository::{
    ActivityRepository, AdmitOutcome, ApplicationRepository, ChatRoomRepository, MatchRepository,
    MatchWithActivity, MessageRepository, SwipeRepository, UserDirectory,
};
pub use services::{
    AdmissionService, ChatService, ChatServiceDependencies, MatchingService,
    MatchingServiceDependencies, ReviewApplicationRequest, SendMessageRequest, SwipeOutcome,
    SwipeRequest, SwipeResult, UpdateMatchRequest,
};
