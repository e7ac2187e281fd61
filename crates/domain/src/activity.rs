use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ActivityId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Cancelled,
    Completed,
    Full,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Full => "full",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "active" => Ok(Self::Active),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "full" => Ok(Self::Full),
            other => Err(DomainError::invalid_argument("activity_status", other)),
        }
    }
}

/// 活动记录。匹配引擎只会递增/递减 `current_participants`，
/// 其余字段归外部的活动管理服务所有。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub host_id: UserId,
    pub title: String,
    pub is_private: bool,
    pub requires_approval: bool,
    pub max_participants: i32,
    pub current_participants: i32,
    pub status: ActivityStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Activity {
    /// 私密或需要审批的活动，Like 滑动产生申请而不是直接匹配。
    pub fn is_gated(&self) -> bool {
        self.is_private || self.requires_approval
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, ActivityStatus::Active)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_participants < self.max_participants
    }
}
