//! 服务测试共用的内存仓储和测试替身。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    Activity, ActivityApplication, ActivityId, ActivityMatch, ActivityStatus, ApplicationId,
    ChatMessage, ChatMessageWithSender, ChatRoom, ChatRoomId, MatchId, MatchStatus, MessageId,
    RepositoryError, Swipe, Timestamp, UserId, UserSummary,
};
use uuid::Uuid;

use crate::broadcaster::{BroadcastError, RoomBroadcaster, RoomEvent};
use crate::clock::Clock;
use crate::repository::{
    ActivityRepository, AdmitOutcome, ApplicationRepository, ChatRoomRepository, MatchRepository,
    MatchWithActivity, MessageRepository, SwipeRepository, UserDirectory,
};

pub fn test_activity(
    host_id: UserId,
    is_private: bool,
    requires_approval: bool,
    max_participants: i32,
    current_participants: i32,
) -> Activity {
    let now = Utc::now();
    Activity {
        id: ActivityId::from(Uuid::new_v4()),
        host_id,
        title: "board games".to_owned(),
        is_private,
        requires_approval,
        max_participants,
        current_participants,
        status: ActivityStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
pub struct FakeActivityRepository {
    activities: Mutex<HashMap<ActivityId, Activity>>,
}

impl FakeActivityRepository {
    pub fn with_activities(activities: Vec<Activity>) -> Self {
        Self {
            activities: Mutex::new(activities.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    pub fn get(&self, id: ActivityId) -> Option<Activity> {
        self.activities.lock().unwrap().get(&id).cloned()
    }

    fn with_mut<R>(&self, id: ActivityId, f: impl FnOnce(&mut Activity) -> R) -> Option<R> {
        self.activities.lock().unwrap().get_mut(&id).map(f)
    }
}

#[async_trait]
impl ActivityRepository for FakeActivityRepository {
    async fn find_by_id(&self, id: ActivityId) -> Result<Option<Activity>, RepositoryError> {
        Ok(self.get(id))
    }
}

#[derive(Default)]
pub struct FakeSwipeRepository {
    swipes: Mutex<Vec<Swipe>>,
}

impl FakeSwipeRepository {
    pub fn count(&self) -> usize {
        self.swipes.lock().unwrap().len()
    }
}

#[async_trait]
impl SwipeRepository for FakeSwipeRepository {
    async fn record(&self, swipe: Swipe) -> Result<Swipe, RepositoryError> {
        let mut swipes = self.swipes.lock().unwrap();
        if let Some(existing) = swipes
            .iter_mut()
            .find(|s| s.user_id == swipe.user_id && s.activity_id == swipe.activity_id)
        {
            existing.direction = swipe.direction;
            return Ok(existing.clone());
        }
        swipes.push(swipe.clone());
        Ok(swipe)
    }
}

pub struct FakeMatchRepository {
    matches: Mutex<Vec<ActivityMatch>>,
    activities: Arc<FakeActivityRepository>,
}

impl FakeMatchRepository {
    pub fn new(activities: Arc<FakeActivityRepository>) -> Self {
        Self {
            matches: Mutex::new(Vec::new()),
            activities,
        }
    }

    pub fn insert(&self, match_record: ActivityMatch) {
        self.matches.lock().unwrap().push(match_record);
    }

    pub fn count(&self) -> usize {
        self.matches.lock().unwrap().len()
    }

    fn claim_seat(&self, activity_id: ActivityId) -> Result<bool, RepositoryError> {
        self.activities
            .with_mut(activity_id, |activity| {
                if activity.current_participants < activity.max_participants {
                    activity.current_participants += 1;
                    true
                } else {
                    false
                }
            })
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl MatchRepository for FakeMatchRepository {
    async fn admit(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
        now: Timestamp,
    ) -> Result<AdmitOutcome, RepositoryError> {
        let mut matches = self.matches.lock().unwrap();
        if let Some(pos) = matches
            .iter()
            .position(|m| m.user_id == user_id && m.activity_id == activity_id)
        {
            if matches[pos].is_active_participant() {
                return Ok(AdmitOutcome::AlreadyAdmitted(matches[pos].clone()));
            }
            // 拒绝或已离开的旧记录重新入场，同样要过容量闸门。
            if !self.claim_seat(activity_id)? {
                return Ok(AdmitOutcome::Full);
            }
            let record = &mut matches[pos];
            record.status = MatchStatus::Approved;
            record.joined_at = Some(now);
            record.left_at = None;
            return Ok(AdmitOutcome::Admitted(record.clone()));
        }

        if !self.claim_seat(activity_id)? {
            return Ok(AdmitOutcome::Full);
        }

        let match_record =
            ActivityMatch::approved(MatchId::from(Uuid::new_v4()), user_id, activity_id, now);
        matches.push(match_record.clone());
        Ok(AdmitOutcome::Admitted(match_record))
    }

    async fn find_by_id(&self, id: MatchId) -> Result<Option<ActivityMatch>, RepositoryError> {
        Ok(self.matches.lock().unwrap().iter().find(|m| m.id == id).cloned())
    }

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityMatch>, RepositoryError> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.user_id == user_id && m.activity_id == activity_id)
            .cloned())
    }

    async fn update_status(
        &self,
        id: MatchId,
        status: MatchStatus,
    ) -> Result<ActivityMatch, RepositoryError> {
        let mut matches = self.matches.lock().unwrap();
        let record = matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if record.is_active_participant() && status != MatchStatus::Approved {
            self.activities.with_mut(record.activity_id, |activity| {
                activity.current_participants = (activity.current_participants - 1).max(0);
            });
        }
        record.status = status;
        Ok(record.clone())
    }

    async fn mark_left(
        &self,
        id: MatchId,
        at: Timestamp,
    ) -> Result<ActivityMatch, RepositoryError> {
        let mut matches = self.matches.lock().unwrap();
        let record = matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if record.left_at.is_none() {
            record.left_at = Some(at);
            self.activities.with_mut(record.activity_id, |activity| {
                activity.current_participants = (activity.current_participants - 1).max(0);
            });
        }
        Ok(record.clone())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MatchWithActivity>, RepositoryError> {
        let matches = self.matches.lock().unwrap();
        Ok(matches
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| {
                self.activities.get(m.activity_id).map(|activity| MatchWithActivity {
                    match_record: m.clone(),
                    activity,
                })
            })
            .collect())
    }

    async fn list_participants(
        &self,
        activity_id: ActivityId,
    ) -> Result<Vec<UserSummary>, RepositoryError> {
        Ok(self
            .matches
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.activity_id == activity_id && m.is_active_participant())
            .map(|m| UserSummary {
                id: m.user_id,
                username: format!("user-{}", m.user_id),
                avatar_url: None,
            })
            .collect())
    }
}

#[derive(Default)]
pub struct FakeApplicationRepository {
    applications: Mutex<Vec<ActivityApplication>>,
}

impl FakeApplicationRepository {
    pub fn count(&self) -> usize {
        self.applications.lock().unwrap().len()
    }
}

#[async_trait]
impl ApplicationRepository for FakeApplicationRepository {
    async fn create(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError> {
        let mut applications = self.applications.lock().unwrap();
        if applications
            .iter()
            .any(|a| a.user_id == application.user_id && a.activity_id == application.activity_id)
        {
            return Err(RepositoryError::Conflict);
        }
        applications.push(application.clone());
        Ok(application)
    }

    async fn find_by_id(
        &self,
        id: ApplicationId,
    ) -> Result<Option<ActivityApplication>, RepositoryError> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn find_for_user(
        &self,
        user_id: UserId,
        activity_id: ActivityId,
    ) -> Result<Option<ActivityApplication>, RepositoryError> {
        Ok(self
            .applications
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.user_id == user_id && a.activity_id == activity_id)
            .cloned())
    }

    async fn update(
        &self,
        application: ActivityApplication,
    ) -> Result<ActivityApplication, RepositoryError> {
        let mut applications = self.applications.lock().unwrap();
        let slot = applications
            .iter_mut()
            .find(|a| a.id == application.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = application.clone();
        Ok(application)
    }
}

#[derive(Default)]
pub struct FakeChatRoomRepository {
    rooms: Mutex<HashMap<ActivityId, ChatRoom>>,
}

#[async_trait]
impl ChatRoomRepository for FakeChatRoomRepository {
    async fn get_or_create(&self, activity_id: ActivityId) -> Result<ChatRoom, RepositoryError> {
        let mut rooms = self.rooms.lock().unwrap();
        Ok(rooms
            .entry(activity_id)
            .or_insert_with(|| ChatRoom {
                id: ChatRoomId::from(Uuid::new_v4()),
                activity_id,
                created_at: Utc::now(),
            })
            .clone())
    }
}

#[derive(Default)]
pub struct FakeUserDirectory {
    users: Mutex<HashMap<UserId, UserSummary>>,
}

impl FakeUserDirectory {
    pub fn insert(&self, user: UserSummary) {
        self.users.lock().unwrap().insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for FakeUserDirectory {
    async fn find_summary(&self, id: UserId) -> Result<Option<UserSummary>, RepositoryError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

pub struct FakeMessageRepository {
    messages: Mutex<Vec<ChatMessage>>,
    users: Arc<FakeUserDirectory>,
    /// 接下来 N 次 create 返回暂时性存储错误，用于重试测试。
    fail_creates: AtomicU32,
}

impl FakeMessageRepository {
    pub fn new(users: Arc<FakeUserDirectory>) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            users,
            fail_creates: AtomicU32::new(0),
        }
    }

    pub fn fail_next_creates(&self, count: u32) {
        self.fail_creates.store(count, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    fn sender_of(&self, sender_id: UserId) -> UserSummary {
        self.users
            .users
            .lock()
            .unwrap()
            .get(&sender_id)
            .cloned()
            .unwrap_or(UserSummary {
                id: sender_id,
                username: String::new(),
                avatar_url: None,
            })
    }
}

#[async_trait]
impl MessageRepository for FakeMessageRepository {
    async fn create(&self, message: ChatMessage) -> Result<ChatMessage, RepositoryError> {
        let remaining = self.fail_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::storage("injected failure"));
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(message)
    }

    async fn find_with_sender(
        &self,
        id: MessageId,
    ) -> Result<Option<ChatMessageWithSender>, RepositoryError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .map(|m| ChatMessageWithSender {
                message: m.clone(),
                sender: self.sender_of(m.sender_id),
            }))
    }

    async fn list_recent(
        &self,
        chat_room_id: ChatRoomId,
        limit: u32,
        before: Option<MessageId>,
    ) -> Result<Vec<ChatMessageWithSender>, RepositoryError> {
        let messages = self.messages.lock().unwrap();
        let mut items: Vec<_> = messages
            .iter()
            .filter(|m| m.chat_room_id == chat_room_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| (a.created_at, a.id.0).cmp(&(b.created_at, b.id.0)));

        if let Some(before) = before {
            if let Some(pos) = items.iter().position(|m| m.id == before) {
                items.truncate(pos);
            }
        }

        let skip = items.len().saturating_sub(limit as usize);
        Ok(items
            .into_iter()
            .skip(skip)
            .map(|m| {
                let sender = self.sender_of(m.sender_id);
                ChatMessageWithSender { message: m, sender }
            })
            .collect())
    }
}

#[derive(Default)]
pub struct CapturingBroadcaster {
    events: Mutex<Vec<RoomEvent>>,
}

impl CapturingBroadcaster {
    pub fn events(&self) -> Vec<RoomEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomBroadcaster for CapturingBroadcaster {
    async fn broadcast(&self, event: RoomEvent) -> Result<(), BroadcastError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// 广播总是失败，用于验证持久化结果不受广播影响。
#[derive(Default)]
pub struct FailingBroadcaster;

#[async_trait]
impl RoomBroadcaster for FailingBroadcaster {
    async fn broadcast(&self, _event: RoomEvent) -> Result<(), BroadcastError> {
        Err(BroadcastError::failed("wire down"))
    }
}

pub struct FixedClock(pub Timestamp);

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}

/// 每次读取前进 1 毫秒，保证测试里的消息时间戳严格递增。
pub struct TickingClock(Mutex<Timestamp>);

impl TickingClock {
    pub fn starting_at(start: Timestamp) -> Self {
        Self(Mutex::new(start))
    }
}

impl Clock for TickingClock {
    fn now(&self) -> Timestamp {
        let mut current = self.0.lock().unwrap();
        *current += chrono::Duration::milliseconds(1);
        *current
    }
}
