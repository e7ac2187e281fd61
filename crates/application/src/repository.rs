use async_trait::async_trait;
use domain::{
    Activity, ActivityApplication, ActivityId, ActivityMatch, ApplicationId, ChatMessage,
    ChatMessageWithSender, ChatRoom, ChatRoomId, MatchId, MessageId, RepositoryError, Swipe,
    Timestamp, UserId, UserSummary,
};
use serde::{Deserialize, Serialize};

/// 容量守护入场的结果。入场必须是单个事务：
/// 比较并递增活动人数，然后插入匹配记录。
#[derive(Debug, Clone, PartialEq)]
pub enum AdmitOutcome {
    /// 新创建的 Approved 匹配，活动人数已 +1。
    Admitted(ActivityMatch),
    /// (user, activity) 已有匹配记录，原样返回，不产生新行。
    AlreadyAdmitted(ActivityMatch),
    /// 比较递增没有命中任何行，活动已满。
    Full,
}

/// 匹配记录加活动摘要，用于 GET /matches。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWithActivity {
    #[serde(flatten)]
    pub match_record: ActivityMatch,
    pub activity: Activity,
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError>;
}

#[async_trait]
pub trait SwipeRepository: Send + Sync {
    /// 幂等记录一次滑动。每个 (user, activity) 只保留一行，
    /// 方向以最新一次为准。
    async fn record(&self, swipe: Swipe) -> Result<Swipe, RepositoryError>;
}

#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// 容量守护的事务入场，所有批准共用这一条路径：
    /// 直接匹配、申请批准、以及拒绝或离开后的重新批准。
    /// 已有在场记录时原样返回，不产生新行也不再占名额。
    async fn admit(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> Result<AdmitOutcome, RepositoryError>;

    async fn find_by_id(&self, id: MatchId) -> Result<Option<ActivityMatch>, RepositoryError>;

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityMatch>, RepositoryError>;

    /// 状态变更；把在场成员降级会同时释放名额。
    async fn update_status(
        &self,
        id: MatchId,
        status: domain::MatchStatus,
    ) -> Result<ActivityMatch, RepositoryError>;

    /// 设置 left_at 并在同一事务里递减活动人数。
    /// 记录保留用于历史查询，不做物理删除。
    async fn mark_left(&self, id: MatchId, at: Timestamp)
        -> Result<ActivityMatch, RepositoryError>;

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MatchWithActivity>, RepositoryError>;

    /// 已批准且未离开的成员（不含房主）。
    async fn list_participants(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<UserSummary>, RepositoryError>;
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// 重复的 (user, activity) 返回 Conflict。
    async fn create(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError>;

    async fn find_by_id(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ActivityApplication>, RepositoryError>;

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityApplication>, RepositoryError>;

    async fn update(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError>;
}

#[async_trait]
pub trait ChatRoomRepository: Send + Sync {
    /// 懒创建：并发的首次访问也只会留下一个房间。
    async fn get_or_create(&self, activity_id: ActivityId) -> Result<ChatRoom, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError>;

    async fn find_with_sender(
        &self,
        id: MessageId,
    ) -> Result<Option<ChatMessageWithSender>, RepositoryError>;

    /// 按 (created_at, id) 排序的历史分页，返回时间正序。
    async fn list_recent(
        &self,
        chat_room_id: ChatRoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<ChatMessageWithSender>, RepositoryError>;
}

/// 外部用户服务的只读接口。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_summary(&self, id: UserId) -> Result<Option<UserSummary>, RepositoryError>;
}
