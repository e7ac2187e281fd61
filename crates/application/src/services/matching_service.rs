use std::sync::Arc;

use domain::{
    ActivityApplication, ActivityId, ActivityMatch, ApplicationId, DomainError, MatchId,
    MatchStatus, Swipe, SwipeDirection, SwipeId, UserId, UserSummary,
};
use uuid::Uuid;

use crate::broadcaster::{RoomBroadcaster, RoomEvent};
use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::repository::{
    ActivityRepository, AdmitOutcome, ApplicationRepository, MatchRepository, MatchWithActivity,
    SwipeRepository, UserDirectory,
};

#[derive(Debug, Clone)]
pub struct SwipeRequest {
    pub user_id: Uuid,
    pub activity_id: Uuid,
    pub direction: SwipeDirection,
    /// 申请制活动附带给房主的留言。
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReviewApplicationRequest {
    pub application_id: Uuid,
    pub reviewer_id: Uuid,
    pub approve: bool,
    pub host_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateMatchRequest {
    pub match_id: Uuid,
    pub caller_id: Uuid,
    pub status: MatchStatus,
}

/// 一次滑动的结果。重复 Like 返回已存在的匹配/申请，不产生新行。
#[derive(Debug, Clone, PartialEq)]
pub enum SwipeOutcome {
    None,
    Applied(ActivityApplication),
    Matched(ActivityMatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwipeResult {
    pub swipe: Swipe,
    pub outcome: SwipeOutcome,
}

pub struct MatchingServiceDependencies {
    pub activity_repository: Arc<dyn ActivityRepository>,
    pub swipe_repository: Arc<dyn SwipeRepository>,
    pub match_repository: Arc<dyn MatchRepository>,
    pub application_repository: Arc<dyn ApplicationRepository>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
    pub broadcaster: Arc<dyn RoomBroadcaster>,
}

/// 匹配引擎：把滑动变成匹配、申请或什么都不做。
pub struct MatchingService {
    deps: MatchingServiceDependencies,
}

impl MatchingService {
    pub fn new(deps: MatchingServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn swipe(&self, request: SwipeRequest) -> Result<SwipeResult, ApplicationError> {
        let user_id = UserId::from(request.user_id);
        let activity_id = ActivityId::from(request.activity_id);

        let activity = self
            .deps
            .activity_repository
            .find_by_id(activity_id)
            .await?
            .ok_or(DomainError::ActivityNotFound)?;

        match activity.status {
            domain::ActivityStatus::Active => {}
            domain::ActivityStatus::Full => return Err(DomainError::ActivityFull.into()),
            _ => return Err(DomainError::ActivityNotActive.into()),
        }

        if activity.host_id == user_id {
            return Err(DomainError::HostCannotSwipe.into());
        }

        let now = self.deps.clock.now();

        // 滑动先落库，与后续结果无关。重复滑动由唯一约束吸收。
        let swipe = self
            .deps
            .swipe_repository
            .record(Swipe::new(
                SwipeId::from(Uuid::new_v4()),
                user_id,
                activity_id,
                request.direction,
                now,
            ))
            .await?;

        let outcome = match request.direction {
            SwipeDirection::Pass => SwipeOutcome::None,
            SwipeDirection::Like if activity.is_gated() => {
                self.apply(user_id, activity_id, activity.host_id, request.message, now)
                    .await?
            }
            SwipeDirection::Like => self.admit(user_id, activity_id, now).await?,
        };

        Ok(SwipeResult { swipe, outcome })
    }

    async fn apply(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        host_id: UserId,
        message: Option<String>,
        now: domain::Timestamp,
    ) -> Result<SwipeOutcome, ApplicationError> {
        let application = ActivityApplication::pending(
            ApplicationId::from(Uuid::new_v4()),
            user_id,
            activity_id,
            host_id,
            message,
            now,
        );

        match self.deps.application_repository.create(application).await {
            Ok(created) => Ok(SwipeOutcome::Applied(created)),
            Err(domain::RepositoryError::Conflict) => {
                // 重复 Like：返回已存在的申请。
                let existing = self
                    .deps
                    .application_repository
                    .find_for_user(user_id, activity_id)
                    .await?
                    .ok_or_else(|| {
                        domain::RepositoryError::storage("conflicting application vanished")
                    })?;
                Ok(SwipeOutcome::Applied(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn admit(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: domain::Timestamp,
    ) -> Result<SwipeOutcome, ApplicationError> {
        match self
            .deps
            .match_repository
            .admit(user_id, activity_id, now)
            .await?
        {
            AdmitOutcome::Admitted(match_record) => {
                self.announce_match(&match_record).await;
                Ok(SwipeOutcome::Matched(match_record))
            }
            AdmitOutcome::AlreadyAdmitted(match_record) => {
                Ok(SwipeOutcome::Matched(match_record))
            }
            AdmitOutcome::Full => Err(DomainError::ActivityFull.into()),
        }
    }

    /// 新匹配的房间广播是尽力而为：失败只记日志，匹配本身已落库。
    async fn announce_match(&self, match_record: &ActivityMatch) {
        let user = match self
            .deps
            .user_directory
            .find_summary(match_record.user_id)
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => UserSummary {
                id: match_record.user_id,
                username: String::new(),
                avatar_url: None,
            },
            Err(err) => {
                tracing::warn!(
                    user_id = %match_record.user_id,
                    error = %err,
                    "failed to load user summary for match broadcast"
                );
                return;
            }
        };

        let event = RoomEvent::new_match(match_record.activity_id, match_record.clone(), user);
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::warn!(
                match_id = %match_record.id,
                error = %err,
                "match persisted but broadcast failed"
            );
        }
    }

    /// 房主审批申请。批准走与直接匹配相同的容量守护入场，
    /// 活动在审批窗口期间满员时申请保持 Pending。
    pub async fn review_application(
        &self,
        request: ReviewApplicationRequest,
    ) -> Result<ActivityApplication, ApplicationError> {
        let reviewer_id = UserId::from(request.reviewer_id);
        let mut application = self
            .deps
            .application_repository
            .find_by_id(ApplicationId::from(request.application_id))
            .await?
            .ok_or(DomainError::ApplicationNotFound)?;

        if application.host_id != reviewer_id {
            return Err(DomainError::NotApplicationHost.into());
        }
        if !application.is_pending() {
            return Err(DomainError::ApplicationAlreadyReviewed.into());
        }

        let now = self.deps.clock.now();

        if request.approve {
            let match_record = match self
                .deps
                .match_repository
                .admit(application.user_id, application.activity_id, now)
                .await?
            {
                AdmitOutcome::Admitted(m) | AdmitOutcome::AlreadyAdmitted(m) => m,
                AdmitOutcome::Full => return Err(DomainError::ActivityFull.into()),
            };

            application.approve(request.host_message, now)?;
            let updated = self.deps.application_repository.update(application).await?;

            let event = RoomEvent::match_updated(match_record.activity_id, match_record.clone());
            if let Err(err) = self.deps.broadcaster.broadcast(event).await {
                tracing::warn!(match_id = %match_record.id, error = %err, "approval broadcast failed");
            }

            Ok(updated)
        } else {
            application.reject(request.host_message, now)?;
            Ok(self.deps.application_repository.update(application).await?)
        }
    }

    /// 匹配状态变更，本人或房主可操作，变更后向房间广播 match_updated。
    pub async fn update_match(
        &self,
        request: UpdateMatchRequest,
    ) -> Result<ActivityMatch, ApplicationError> {
        let caller_id = UserId::from(request.caller_id);
        let match_record = self
            .deps
            .match_repository
            .find_by_id(MatchId::from(request.match_id))
            .await?
            .ok_or(DomainError::MatchNotFound)?;

        self.ensure_match_operator(&match_record, caller_id).await?;

        // 批准一律走容量守护入场：拒绝或离开后重新批准要重新占名额，
        // 活动满了就挡下。降级在场成员由仓储释放名额。
        let updated = if request.status == MatchStatus::Approved {
            let now = self.deps.clock.now();
            match self
                .deps
                .match_repository
                .admit(match_record.user_id, match_record.activity_id, now)
                .await?
            {
                AdmitOutcome::Admitted(m) | AdmitOutcome::AlreadyAdmitted(m) => m,
                AdmitOutcome::Full => return Err(DomainError::ActivityFull.into()),
            }
        } else {
            self.deps
                .match_repository
                .update_status(match_record.id, request.status)
                .await?
        };

        let event = RoomEvent::match_updated(updated.activity_id, updated.clone());
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::warn!(match_id = %updated.id, error = %err, "match update broadcast failed");
        }

        Ok(updated)
    }

    /// 离开活动：设置 left_at 并释放名额，记录保留。
    pub async fn leave_activity(
        &self,
        match_id: Uuid,
        caller_id: Uuid,
    ) -> Result<ActivityMatch, ApplicationError> {
        let caller_id = UserId::from(caller_id);
        let match_record = self
            .deps
            .match_repository
            .find_by_id(MatchId::from(match_id))
            .await?
            .ok_or(DomainError::MatchNotFound)?;

        if match_record.user_id != caller_id {
            return Err(DomainError::OperationNotAllowed.into());
        }
        if match_record.left_at.is_some() {
            return Ok(match_record);
        }

        let now = self.deps.clock.now();
        let updated = self.deps.match_repository.mark_left(match_record.id, now).await?;

        let event = RoomEvent::match_updated(updated.activity_id, updated.clone());
        if let Err(err) = self.deps.broadcaster.broadcast(event).await {
            tracing::warn!(match_id = %updated.id, error = %err, "leave broadcast failed");
        }

        Ok(updated)
    }

    pub async fn list_matches(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<MatchWithActivity>, ApplicationError> {
        Ok(self
            .deps
            .match_repository
            .list_for_user(UserId::from(user_id))
            .await?)
    }

    /// 活动的在场成员：房主加上已批准未离开的匹配。
    pub async fn list_participants(
        &self,
        activity_id: Uuid,
    ) -> Result<Vec<UserSummary>, ApplicationError> {
        let activity_id = ActivityId::from(activity_id);
        let activity = self
            .deps
            .activity_repository
            .find_by_id(activity_id)
            .await?
            .ok_or(DomainError::ActivityNotFound)?;

        let mut participants = Vec::new();
        if let Some(host) = self.deps.user_directory.find_summary(activity.host_id).await? {
            participants.push(host);
        }
        participants.extend(self.deps.match_repository.list_participants(activity_id).await?);
        Ok(participants)
    }

    async fn ensure_match_operator(
        &self,
        match_record: &ActivityMatch,
        caller_id: UserId,
    ) -> Result<(), ApplicationError> {
        if match_record.user_id == caller_id {
            return Ok(());
        }
        let activity = self
            .deps
            .activity_repository
            .find_by_id(match_record.activity_id)
            .await?
            .ok_or(DomainError::ActivityNotFound)?;
        if activity.host_id == caller_id {
            return Ok(());
        }
        Err(DomainError::OperationNotAllowed.into())
    }
}
