use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ActivityId, SwipeId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Like,
    Pass,
}

impl SwipeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Pass => "pass",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value {
            "like" => Ok(Self::Like),
            "pass" => Ok(Self::Pass),
            other => Err(DomainError::invalid_argument("direction", other)),
        }
    }
}

/// 一次滑动。创建后不可变，每个 (user, activity) 至多一条。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swipe {
    pub id: SwipeId,
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub direction: SwipeDirection,
    pub created_at: Timestamp,
}

impl Swipe {
    pub fn new(
        id: SwipeId,
        user_id: UserId,
        activity_id: ActivityId,
        direction: SwipeDirection,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            activity_id,
            direction,
            created_at,
        }
    }
}
