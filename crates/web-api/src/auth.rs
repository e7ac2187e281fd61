//! 请求身份提取。
//!
//! 认证由上游网关完成，这里只信任反向代理注入的 `x-user-id` 头。

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// 已认证的请求发起者。
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing x-user-id header"))?;

        let user_id = raw
            .parse::<Uuid>()
            .map_err(|_| ApiError::unauthorized("x-user-id is not a valid uuid"))?;

        Ok(AuthenticatedUser(user_id))
    }
}
