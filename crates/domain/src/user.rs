use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

/// 外部用户服务的只读投影，用于消息和匹配的展示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}
