use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;
        use domain::DomainError;

        match error {
            AppErr::Domain(DomainError::InvalidArgument { field, reason }) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                format!("{}: {}", field, reason),
            ),
            AppErr::Domain(DomainError::ActivityNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "ACTIVITY_NOT_FOUND",
                "activity not found",
            ),
            AppErr::Domain(DomainError::MatchNotFound) => {
                ApiError::new(StatusCode::NOT_FOUND, "MATCH_NOT_FOUND", "match not found")
            }
            AppErr::Domain(DomainError::ApplicationNotFound) => ApiError::new(
                StatusCode::NOT_FOUND,
                "APPLICATION_NOT_FOUND",
                "application not found",
            ),
            AppErr::Domain(DomainError::ActivityFull) => {
                ApiError::new(StatusCode::CONFLICT, "ACTIVITY_FULL", "activity is full")
            }
            AppErr::Domain(DomainError::ApplicationAlreadyReviewed) => ApiError::new(
                StatusCode::CONFLICT,
                "APPLICATION_REVIEWED",
                "application already reviewed",
            ),
            AppErr::Domain(DomainError::ActivityNotActive) => ApiError::new(
                StatusCode::FORBIDDEN,
                "ACTIVITY_NOT_ACTIVE",
                "activity is not active",
            ),
            AppErr::Domain(DomainError::HostCannotSwipe) => ApiError::new(
                StatusCode::FORBIDDEN,
                "HOST_CANNOT_SWIPE",
                "host cannot swipe own activity",
            ),
            AppErr::Domain(DomainError::NotParticipant) => ApiError::new(
                StatusCode::FORBIDDEN,
                "NOT_PARTICIPANT",
                "user is not a participant of this activity",
            ),
            AppErr::Domain(DomainError::NotApplicationHost) => ApiError::new(
                StatusCode::FORBIDDEN,
                "NOT_APPLICATION_HOST",
                "only the activity host may review applications",
            ),
            AppErr::Domain(DomainError::OperationNotAllowed) => ApiError::new(
                StatusCode::FORBIDDEN,
                "OPERATION_NOT_ALLOWED",
                "operation not allowed",
            ),
            AppErr::Repository(repo_err) => match repo_err {
                domain::RepositoryError::NotFound => ApiError::new(
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    "requested resource not found",
                ),
                domain::RepositoryError::Conflict => {
                    ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource already exists")
                }
                domain::RepositoryError::Storage { message, .. } => ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    format!("database error: {}", message),
                ),
            },
            AppErr::Broadcast(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "BROADCAST_ERROR",
                format!("broadcast error: {}", err),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
