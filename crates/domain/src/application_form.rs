use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{ActivityId, ApplicationId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
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
            other => Err(DomainError::invalid_argument("application_status", other)),
        }
    }
}

/// 私密/审批制活动的参与申请。房主把 Pending 审成 Approved 或 Rejected；
/// 批准的同时必须走与直接匹配相同的容量守护事务创建匹配记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityApplication {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub activity_id: ActivityId,
    pub host_id: UserId,
    pub status: ApplicationStatus,
    pub message: Option<String>,
    pub host_message: Option<String>,
    pub applied_at: Timestamp,
    pub reviewed_at: Option<Timestamp>,
}

impl ActivityApplication {
    pub fn pending(
        id: ApplicationId,
        user_id: UserId,
        activity_id: ActivityId,
        host_id: UserId,
        message: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            activity_id,
            host_id,
            status: ApplicationStatus::Pending,
            message,
            host_message: None,
            applied_at: now,
            reviewed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ApplicationStatus::Pending)
    }

    pub fn approve(
        &mut self,
        host_message: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::ApplicationAlreadyReviewed);
        }
        self.status = ApplicationStatus::Approved;
        self.host_message = host_message;
        self.reviewed_at = Some(now);
        Ok(())
    }

    pub fn reject(
        &mut self,
        host_message: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::ApplicationAlreadyReviewed);
        }
        self.status = ApplicationStatus::Rejected;
        self.host_message = host_message;
        self.reviewed_at = Some(now);
        Ok(())
    }
}
