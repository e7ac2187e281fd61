use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ActivityId, MatchId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Approved,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(DomainError::invalid_argument("match_status", other)),
        }
    }
}

/// 活动参与记录，准入判定的唯一事实来源。
/// 开放活动在匹配时直接以 Approved 创建；申请制活动在房主批准时创建。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityMatch {
    pub id: MatchId,
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub status: MatchStatus,
    pub joined_at: Option<Timestamp>,
    pub left_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl ActivityMatch {
    pub fn approved(
        id: MatchId,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            activity_id,
            status: MatchStatus::Approved,
            joined_at: Some(now),
            left_at: None,
            created_at: now,
        }
    }

    /// 已批准且未离开的成员才算在场参与者。
    pub fn is_active_participant(&self) -> bool {
        matches!(self.status, MatchStatus::Approved) && self.left_at.is_none()
    }
}
