//! 活动匹配与实时聊天的核心领域模型
//!
//! 包含活动、滑动、匹配、申请、聊天室等实体，以及相关的业务规则。

pub mod activity;
pub mod application_form;
pub mod chat;
pub mod errors;
pub mod match_record;
pub mod swipe;
pub mod user;
pub mod value_objects;

pub use activity::{Activity, ActivityStatus};
pub use application_form::{ActivityApplication, ApplicationStatus};
pub use chat::{ChatMessage, ChatMessageWithSender, ChatRoom, MessageType};
pub use errors::{DomainError, RepositoryError};
pub use match_record::{ActivityMatch, MatchStatus};
pub use swipe::{Swipe, SwipeDirection};
pub use user::UserSummary;
pub use value_objects::{
    ActivityId, ApplicationId, ChatRoomId, MatchId, MessageContent, MessageId, SwipeId, Timestamp,
    UserId,
};
