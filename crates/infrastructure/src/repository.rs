use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

use application::{
    ActivityRepository, AdmitOutcome, ApplicationRepository, ChatRoomRepository, MatchRepository,
    MatchWithActivity, MessageRepository, SwipeRepository, UserDirectory,
};
use domain::{
    Activity, ActivityApplication, ActivityId, ActivityMatch, ActivityStatus, ApplicationId,
    ApplicationStatus, ChatMessage, ChatMessageWithSender, ChatRoom, ChatRoomId, MatchId,
    MatchStatus, MessageContent, MessageId, MessageType, RepositoryError, Swipe, SwipeDirection,
    SwipeId, Timestamp, UserId, UserSummary,
};

pub async fn create_pg_pool(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
        other => RepositoryError::storage(other.to_string()),
    }
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct ActivityRecord {
    id: Uuid,
    host_id: Uuid,
    title: String,
    is_private: bool,
    requires_approval: bool,
    max_participants: i32,
    current_participants: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ActivityRecord> for Activity {
    type Error = RepositoryError;

    fn try_from(value: ActivityRecord) -> Result<Self, Self::Error> {
        let status =
            ActivityStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Activity {
            id: ActivityId::from(value.id),
            host_id: UserId::from(value.host_id),
            title: value.title,
            is_private: value.is_private,
            requires_approval: value.requires_approval,
            max_participants: value.max_participants,
            current_participants: value.current_participants,
            status,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SwipeRecord {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    direction: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<SwipeRecord> for Swipe {
    type Error = RepositoryError;

    fn try_from(value: SwipeRecord) -> Result<Self, Self::Error> {
        let direction =
            SwipeDirection::parse(&value.direction).map_err(|err| invalid_data(err.to_string()))?;
        Ok(Swipe::new(
            SwipeId::from(value.id),
            UserId::from(value.user_id),
            ActivityId::from(value.activity_id),
            direction,
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MatchRecord {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    status: String,
    joined_at: Option<DateTime<Utc>>,
    left_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MatchRecord> for ActivityMatch {
    type Error = RepositoryError;

    fn try_from(value: MatchRecord) -> Result<Self, Self::Error> {
        let status =
            MatchStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;
        Ok(ActivityMatch {
            id: MatchId::from(value.id),
            user_id: UserId::from(value.user_id),
            activity_id: ActivityId::from(value.activity_id),
            status,
            joined_at: value.joined_at,
            left_at: value.left_at,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRecord {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    host_id: Uuid,
    status: String,
    message: Option<String>,
    host_message: Option<String>,
    applied_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApplicationRecord> for ActivityApplication {
    type Error = RepositoryError;

    fn try_from(value: ApplicationRecord) -> Result<Self, Self::Error> {
        let status =
            ApplicationStatus::parse(&value.status).map_err(|err| invalid_data(err.to_string()))?;
        Ok(ActivityApplication {
            id: ApplicationId::from(value.id),
            user_id: UserId::from(value.user_id),
            activity_id: ActivityId::from(value.activity_id),
            host_id: UserId::from(value.host_id),
            status,
            message: value.message,
            host_message: value.host_message,
            applied_at: value.applied_at,
            reviewed_at: value.reviewed_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ChatRoomRecord {
    id: Uuid,
    activity_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<ChatRoomRecord> for ChatRoom {
    fn from(value: ChatRoomRecord) -> Self {
        ChatRoom {
            id: ChatRoomId::from(value.id),
            activity_id: ActivityId::from(value.activity_id),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    chat_room_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for ChatMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let content =
            MessageContent::new(value.content).map_err(|err| invalid_data(err.to_string()))?;
        let message_type =
            MessageType::parse(&value.message_type).map_err(|err| invalid_data(err.to_string()))?;
        Ok(ChatMessage::new(
            MessageId::from(value.id),
            ChatRoomId::from(value.chat_room_id),
            UserId::from(value.sender_id),
            content,
            message_type,
            value.created_at,
        ))
    }
}

#[derive(Debug, FromRow)]
struct MessageWithSenderRecord {
    id: Uuid,
    chat_room_id: Uuid,
    sender_id: Uuid,
    content: String,
    message_type: String,
    created_at: DateTime<Utc>,
    sender_username: String,
    sender_avatar_url: Option<String>,
}

impl TryFrom<MessageWithSenderRecord> for ChatMessageWithSender {
    type Error = RepositoryError;

    fn try_from(value: MessageWithSenderRecord) -> Result<Self, Self::Error> {
        let sender = UserSummary {
            id: UserId::from(value.sender_id),
            username: value.sender_username.clone(),
            avatar_url: value.sender_avatar_url.clone(),
        };
        let message = ChatMessage::try_from(MessageRecord {
            id: value.id,
            chat_room_id: value.chat_room_id,
            sender_id: value.sender_id,
            content: value.content,
            message_type: value.message_type,
            created_at: value.created_at,
        })?;
        Ok(ChatMessageWithSender { message, sender })
    }
}

#[derive(Debug, FromRow)]
struct MatchWithActivityRecord {
    id: Uuid,
    user_id: Uuid,
    activity_id: Uuid,
    status: String,
    joined_at: Option<DateTime<Utc>>,
    left_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    a_id: Uuid,
    a_host_id: Uuid,
    a_title: String,
    a_is_private: bool,
    a_requires_approval: bool,
    a_max_participants: i32,
    a_current_participants: i32,
    a_status: String,
    a_created_at: DateTime<Utc>,
    a_updated_at: DateTime<Utc>,
}

impl TryFrom<MatchWithActivityRecord> for MatchWithActivity {
    type Error = RepositoryError;

    fn try_from(value: MatchWithActivityRecord) -> Result<Self, Self::Error> {
        let match_record = ActivityMatch::try_from(MatchRecord {
            id: value.id,
            user_id: value.user_id,
            activity_id: value.activity_id,
            status: value.status,
            joined_at: value.joined_at,
            left_at: value.left_at,
            created_at: value.created_at,
        })?;
        let activity = Activity::try_from(ActivityRecord {
            id: value.a_id,
            host_id: value.a_host_id,
            title: value.a_title,
            is_private: value.a_is_private,
            requires_approval: value.a_requires_approval,
            max_participants: value.a_max_participants,
            current_participants: value.a_current_participants,
            status: value.a_status,
            created_at: value.a_created_at,
            updated_at: value.a_updated_at,
        })?;
        Ok(MatchWithActivity {
            match_record,
            activity,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserSummaryRecord {
    id: Uuid,
    username: String,
    avatar_url: Option<String>,
}

impl From<UserSummaryRecord> for UserSummary {
    fn from(value: UserSummaryRecord) -> Self {
        UserSummary {
            id: UserId::from(value.id),
            username: value.username,
            avatar_url: value.avatar_url,
        }
    }
}

#[derive(Clone)]
pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for PgActivityRepository {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError> {
        let record = sqlx::query_as::<_, ActivityRecord>(
            r#"
            SELECT id, host_id, title, is_private, requires_approval,
                   max_participants, current_participants, status, created_at, updated_at
            FROM activities
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Activity::try_from).transpose()
    }
}

#[derive(Clone)]
pub struct PgSwipeRepository {
    pool: PgPool,
}

impl PgSwipeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SwipeRepository for PgSwipeRepository {
    async fn record(&self, swipe: Swipe) -> Result<Swipe, RepositoryError> {
        // 每个 (user, activity) 只保留一行，方向以最新一次滑动为准，
        // 原有的 id 和 created_at 不动。
        let record = sqlx::query_as::<_, SwipeRecord>(
            r#"
            INSERT INTO activity_swipes (id, user_id, activity_id, direction, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, activity_id)
            DO UPDATE SET direction = EXCLUDED.direction
            RETURNING id, user_id, activity_id, direction, created_at
            "#,
        )
        .bind(Uuid::from(swipe.id))
        .bind(Uuid::from(swipe.user_id))
        .bind(Uuid::from(swipe.activity_id))
        .bind(swipe.direction.as_str())
        .bind(swipe.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Swipe::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgMatchRepository {
    pool: PgPool,
}

impl PgMatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 比较并递增：零行更新即活动已满，绝不先读后写。
    async fn claim_seat(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> Result<bool, RepositoryError> {
        let updated = sqlx::query(
            r#"
            UPDATE activities
            SET current_participants = current_participants + 1, updated_at = $2
            WHERE id = $1 AND current_participants < max_participants
            "#,
        )
        .bind(Uuid::from(activity_id))
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;

        Ok(updated.rows_affected() > 0)
    }
}

const MATCH_COLUMNS: &str = "id, user_id, activity_id, status, joined_at, left_at, created_at";

#[async_trait]
impl MatchRepository for PgMatchRepository {
    /// 单个事务里的容量守护入场：
    /// 行锁挡住并发的同一用户重复入场，比较递增挡住超额入场。
    /// 拒绝或已离开的旧记录重新入场时同样要过容量闸门。
    async fn admit(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> Result<AdmitOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let existing = sqlx::query_as::<_, MatchRecord>(
            r#"
            SELECT id, user_id, activity_id, status, joined_at, left_at, created_at
            FROM activity_matches
            WHERE user_id = $1 AND activity_id = $2
            FOR UPDATE
            "#,
        )
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(activity_id))
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(record) = existing {
            let current = ActivityMatch::try_from(record)?;
            if current.is_active_participant() {
                tx.rollback().await.map_err(map_sqlx_err)?;
                return Ok(AdmitOutcome::AlreadyAdmitted(current));
            }

            if !Self::claim_seat(&mut tx, activity_id, now).await? {
                tx.rollback().await.map_err(map_sqlx_err)?;
                return Ok(AdmitOutcome::Full);
            }

            let record = sqlx::query_as::<_, MatchRecord>(&format!(
                "UPDATE activity_matches \
                 SET status = 'approved', joined_at = $2, left_at = NULL \
                 WHERE id = $1 \
                 RETURNING {MATCH_COLUMNS}"
            ))
            .bind(Uuid::from(current.id))
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

            tx.commit().await.map_err(map_sqlx_err)?;
            return Ok(AdmitOutcome::Admitted(ActivityMatch::try_from(record)?));
        }

        if !Self::claim_seat(&mut tx, activity_id, now).await? {
            tx.rollback().await.map_err(map_sqlx_err)?;
            return Ok(AdmitOutcome::Full);
        }

        let inserted = sqlx::query_as::<_, MatchRecord>(
            r#"
            INSERT INTO activity_matches (id, user_id, activity_id, status, joined_at, created_at)
            VALUES ($1, $2, $3, 'approved', $4, $4)
            RETURNING id, user_id, activity_id, status, joined_at, left_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(activity_id))
        .bind(now)
        .fetch_one(&mut *tx)
        .await;

        match inserted {
            Ok(record) => {
                tx.commit().await.map_err(map_sqlx_err)?;
                Ok(AdmitOutcome::Admitted(ActivityMatch::try_from(record)?))
            }
            Err(err) => {
                let err = map_sqlx_err(err);
                // 行锁只护住已有行：两个首次入场可以同时走到这里，
                // 输家的插入撞唯一约束。事务连同递增一起回滚，
                // 名额记在先到者头上，这里返回它留下的匹配。
                drop(tx);
                if matches!(err, RepositoryError::Conflict) {
                    let record = sqlx::query_as::<_, MatchRecord>(&format!(
                        "SELECT {MATCH_COLUMNS} FROM activity_matches \
                         WHERE user_id = $1 AND activity_id = $2"
                    ))
                    .bind(Uuid::from(user_id))
                    .bind(Uuid::from(activity_id))
                    .fetch_one(&self.pool)
                    .await
                    .map_err(map_sqlx_err)?;
                    return Ok(AdmitOutcome::AlreadyAdmitted(ActivityMatch::try_from(record)?));
                }
                Err(err)
            }
        }
    }

    async fn find_by_id(&self, id: MatchId) -> Result<Option<ActivityMatch>, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {MATCH_COLUMNS} FROM activity_matches WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ActivityMatch::try_from).transpose()
    }

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityMatch>, RepositoryError> {
        let record = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {MATCH_COLUMNS} FROM activity_matches WHERE user_id = $1 AND activity_id = $2"
        ))
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(activity_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ActivityMatch::try_from).transpose()
    }

    /// 把在场成员降级会同时释放名额。重新批准不走这里，
    /// 统一经由 admit 的容量闸门。
    async fn update_status(
        &self,
        id: MatchId,
        status: MatchStatus,
    ) -> Result<ActivityMatch, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let current = sqlx::query_as::<_, MatchRecord>(&format!(
            "SELECT {MATCH_COLUMNS} FROM activity_matches WHERE id = $1 FOR UPDATE"
        ))
        .bind(Uuid::from(id))
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        let current = ActivityMatch::try_from(current)?;

        let record = sqlx::query_as::<_, MatchRecord>(&format!(
            "UPDATE activity_matches SET status = $2 WHERE id = $1 RETURNING {MATCH_COLUMNS}"
        ))
        .bind(Uuid::from(id))
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if current.is_active_participant() && !matches!(status, MatchStatus::Approved) {
            sqlx::query(
                r#"
                UPDATE activities
                SET current_participants = GREATEST(current_participants - 1, 0), updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(Uuid::from(current.activity_id))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        ActivityMatch::try_from(record)
    }

    async fn mark_left(
        &self,
        id: MatchId,
        at: Timestamp,
    ) -> Result<ActivityMatch, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let record = sqlx::query_as::<_, MatchRecord>(&format!(
            "UPDATE activity_matches SET left_at = $2 \
             WHERE id = $1 AND left_at IS NULL RETURNING {MATCH_COLUMNS}"
        ))
        .bind(Uuid::from(id))
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let Some(record) = record else {
            // 已经离开过：幂等返回现状，不再动名额。
            tx.rollback().await.map_err(map_sqlx_err)?;
            let existing = sqlx::query_as::<_, MatchRecord>(&format!(
                "SELECT {MATCH_COLUMNS} FROM activity_matches WHERE id = $1"
            ))
            .bind(Uuid::from(id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
            return ActivityMatch::try_from(existing);
        };

        sqlx::query(
            r#"
            UPDATE activities
            SET current_participants = GREATEST(current_participants - 1, 0), updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(record.activity_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        ActivityMatch::try_from(record)
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MatchWithActivity>, RepositoryError> {
        let records = sqlx::query_as::<_, MatchWithActivityRecord>(
            r#"
            SELECT m.id, m.user_id, m.activity_id, m.status, m.joined_at, m.left_at, m.created_at,
                   a.id AS a_id, a.host_id AS a_host_id, a.title AS a_title,
                   a.is_private AS a_is_private, a.requires_approval AS a_requires_approval,
                   a.max_participants AS a_max_participants,
                   a.current_participants AS a_current_participants,
                   a.status AS a_status, a.created_at AS a_created_at, a.updated_at AS a_updated_at
            FROM activity_matches m
            JOIN activities a ON a.id = m.activity_id
            WHERE m.user_id = $1
            ORDER BY m.created_at DESC
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records
            .into_iter()
            .map(MatchWithActivity::try_from)
            .collect()
    }

    async fn list_participants(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<UserSummary>, RepositoryError> {
        let records = sqlx::query_as::<_, UserSummaryRecord>(
            r#"
            SELECT u.id, u.username, u.avatar_url
            FROM activity_matches m
            JOIN users u ON u.id = m.user_id
            WHERE m.activity_id = $1 AND m.status = 'approved' AND m.left_at IS NULL
            ORDER BY m.joined_at
            "#,
        )
        .bind(Uuid::from(activity_id))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(records.into_iter().map(UserSummary::from).collect())
    }
}

#[derive(Clone)]
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const APPLICATION_COLUMNS: &str =
    "id, user_id, activity_id, host_id, status, message, host_message, applied_at, reviewed_at";

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn create(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "INSERT INTO activity_applications \
             (id, user_id, activity_id, host_id, status, message, applied_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(Uuid::from(application.id))
        .bind(Uuid::from(application.user_id))
        .bind(Uuid::from(application.activity_id))
        .bind(Uuid::from(application.host_id))
        .bind(application.status.as_str())
        .bind(&application.message)
        .bind(application.applied_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ActivityApplication::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ActivityApplication>, RepositoryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM activity_applications WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ActivityApplication::try_from).transpose()
    }

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityApplication>, RepositoryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM activity_applications \
             WHERE user_id = $1 AND activity_id = $2"
        ))
        .bind(Uuid::from(user_id))
        .bind(Uuid::from(activity_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ActivityApplication::try_from).transpose()
    }

    async fn update(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError> {
        let record = sqlx::query_as::<_, ApplicationRecord>(&format!(
            "UPDATE activity_applications \
             SET status = $2, host_message = $3, reviewed_at = $4 \
             WHERE id = $1 \
             RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(Uuid::from(application.id))
        .bind(application.status.as_str())
        .bind(&application.host_message)
        .bind(application.reviewed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ActivityApplication::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn get_or_create(&self, activity_id: ActivityId) -> Result<ChatRoom, RepositoryError> {
        // 并发的首次访问靠 activity_id 唯一约束收敛到同一个房间。
        let inserted = sqlx::query_as::<_, ChatRoomRecord>(
            r#"
            INSERT INTO chat_rooms (id, activity_id)
            VALUES ($1, $2)
            ON CONFLICT (activity_id) DO NOTHING
            RETURNING id, activity_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(Uuid::from(activity_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(record) = inserted {
            return Ok(ChatRoom::from(record));
        }

        let existing = sqlx::query_as::<_, ChatRoomRecord>(
            "SELECT id, activity_id, created_at FROM chat_rooms WHERE activity_id = $1",
        )
        .bind(Uuid::from(activity_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ChatRoom::from(existing))
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const MESSAGE_WITH_SENDER_COLUMNS: &str =
    "m.id, m.chat_room_id, m.sender_id, m.content, m.message_type, m.created_at, \
     u.username AS sender_username, u.avatar_url AS sender_avatar_url";

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO chat_messages (id, chat_room_id, sender_id, content, message_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, chat_room_id, sender_id, content, message_type, created_at
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.chat_room_id))
        .bind(Uuid::from(message.sender_id))
        .bind(message.content.as_str())
        .bind(message.message_type.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatMessage::try_from(record)
    }

    async fn find_with_sender(
        &self,
        id: MessageId,
    ) -> Result<Option<ChatMessageWithSender>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageWithSenderRecord>(&format!(
            "SELECT {MESSAGE_WITH_SENDER_COLUMNS} \
             FROM chat_messages m JOIN users u ON u.id = m.sender_id \
             WHERE m.id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ChatMessageWithSender::try_from).transpose()
    }

    async fn list_recent(
        &self,
        chat_room_id: ChatRoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<ChatMessageWithSender>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageWithSenderRecord>(&format!(
            "SELECT {MESSAGE_WITH_SENDER_COLUMNS} \
             FROM chat_messages m JOIN users u ON u.id = m.sender_id \
             WHERE m.chat_room_id = $1 \
               AND ($2::uuid IS NULL OR (m.created_at, m.id) < \
                    (SELECT b.created_at, b.id FROM chat_messages b WHERE b.id = $2)) \
             ORDER BY m.created_at DESC, m.id DESC \
             LIMIT $3"
        ))
        .bind(Uuid::from(chat_room_id))
        .bind(before.map(Uuid::from))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // 倒序取最近一页，再翻回时间正序交给调用方。
        let mut items = records
            .into_iter()
            .map(ChatMessageWithSender::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        items.reverse();
        Ok(items)
    }
}

#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_summary(&self, id: UserId) -> Result<Option<UserSummary>, RepositoryError> {
        let record = sqlx::query_as::<_, UserSummaryRecord>(
            "SELECT id, username, avatar_url FROM users WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(record.map(UserSummary::from))
    }
}
