use std::sync::Arc;

use domain::{ActivityId, DomainError, UserId};

use crate::error::ApplicationError;
use crate::repository::{ActivityRepository, MatchRepository};

/// 聊天准入判定：房主，或持有未离开的 Approved 匹配。
///
/// 历史读取、消息写入、WebSocket 加入三处都要走这一个检查，
/// 每次调用重新查询，匹配状态的变化不会被陈旧缓存吞掉。
pub struct AdmissionService {
    activity_repository: Arc<dyn ActivityRepository>,
    match_repository: Arc<dyn MatchRepository>,
}

impl AdmissionService {
    pub fn new(
        activity_repository: Arc<dyn ActivityRepository>,
        match_repository: Arc<dyn MatchRepository>,
    ) -> Self {
        Self {
            activity_repository,
            match_repository,
        }
    }

    pub async fn can_access_chat(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<bool, ApplicationError> {
        let activity = self
            .activity_repository
            .find_by_id(activity_id)
            .await?
            .ok_or(DomainError::ActivityNotFound)?;

        if activity.host_id == user_id {
            return Ok(true);
        }

        let allowed = self
            .match_repository
            .find_for_user(user_id, activity_id)
            .await?
            .map(|m| m.is_active_participant())
            .unwrap_or(false);

        Ok(allowed)
    }

    /// 同 can_access_chat，但把拒绝变成错误，方便服务层直接用 `?`。
    pub async fn require_access(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<(), ApplicationError> {
        if self.can_access_chat(user_id, activity_id).await? {
            Ok(())
        } else {
            Err(DomainError::NotParticipant.into())
        }
    }
}
