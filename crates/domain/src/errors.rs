use thiserror::Error;

/// 领域错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("activity not found")]
    ActivityNotFound,
    #[error("activity is not active")]
    ActivityNotActive,
    #[error("activity is full")]
    ActivityFull,
    #[error("host cannot swipe own activity")]
    HostCannotSwipe,
    #[error("user is not a participant of this activity")]
    NotParticipant,
    #[error("match not found")]
    MatchNotFound,
    #[error("application not found")]
    ApplicationNotFound,
    #[error("application already reviewed")]
    ApplicationAlreadyReviewed,
    #[error("only the activity host may review applications")]
    NotApplicationHost,
    #[error("operation not allowed")]
    OperationNotAllowed,
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 仓储层错误。Storage 表示暂时性的底层存储故障。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record already exists")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// 暂时性错误可以安全地重试一次。
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
