//! 匹配引擎单元测试：滑动结果、幂等、容量守护、申请审批。

use std::sync::Arc;

use chrono::Utc;
use domain::{
    ActivityMatch, ActivityStatus, DomainError, MatchId, MatchStatus, SwipeDirection, UserId,
};
use uuid::Uuid;

use crate::error::ApplicationError;
use crate::repository::{ApplicationRepository, MatchRepository};
use crate::services::test_support::*;
use crate::services::{
    AdmissionService, MatchingService, MatchingServiceDependencies, ReviewApplicationRequest,
    SwipeOutcome, SwipeRequest, UpdateMatchRequest,
};
use crate::RoomEventPayload;

struct Harness {
    service: MatchingService,
    admission: AdmissionService,
    activities: Arc<FakeActivityRepository>,
    swipes: Arc<FakeSwipeRepository>,
    matches: Arc<FakeMatchRepository>,
    applications: Arc<FakeApplicationRepository>,
    users: Arc<FakeUserDirectory>,
    broadcaster: Arc<CapturingBroadcaster>,
}

fn harness(activities: Vec<domain::Activity>) -> Harness {
    let activities = Arc::new(FakeActivityRepository::with_activities(activities));
    let swipes = Arc::new(FakeSwipeRepository::default());
    let matches = Arc::new(FakeMatchRepository::new(activities.clone()));
    let applications = Arc::new(FakeApplicationRepository::default());
    let users = Arc::new(FakeUserDirectory::default());
    let broadcaster = Arc::new(CapturingBroadcaster::default());

    let service = MatchingService::new(MatchingServiceDependencies {
        activity_repository: activities.clone(),
        swipe_repository: swipes.clone(),
        match_repository: matches.clone(),
        application_repository: applications.clone(),
        user_directory: users.clone(),
        clock: Arc::new(FixedClock(Utc::now())),
        broadcaster: broadcaster.clone(),
    });
    let admission = AdmissionService::new(activities.clone(), matches.clone());

    Harness {
        service,
        admission,
        activities,
        swipes,
        matches,
        applications,
        users,
        broadcaster,
    }
}

fn like(user_id: UserId, activity_id: domain::ActivityId) -> SwipeRequest {
    SwipeRequest {
        user_id: user_id.into(),
        activity_id: activity_id.into(),
        direction: SwipeDirection::Like,
        message: None,
    }
}

#[tokio::test]
async fn like_on_open_activity_creates_approved_match() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 3);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();

    let matched = match result.outcome {
        SwipeOutcome::Matched(m) => m,
        other => panic!("expected Matched, got {other:?}"),
    };
    assert_eq!(matched.status, MatchStatus::Approved);
    assert!(matched.joined_at.is_some());
    // 人数恰好 +1。
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 4);
    // 匹配后立即获得聊天准入。
    assert!(h.admission.can_access_chat(user, activity.id).await.unwrap());
}

#[tokio::test]
async fn pass_records_swipe_and_nothing_else() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 3);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h
        .service
        .swipe(SwipeRequest {
            user_id: user.into(),
            activity_id: activity.id.into(),
            direction: SwipeDirection::Pass,
            message: None,
        })
        .await
        .unwrap();

    assert_eq!(result.outcome, SwipeOutcome::None);
    assert_eq!(h.swipes.count(), 1);
    assert_eq!(h.matches.count(), 0);
    assert_eq!(h.applications.count(), 0);
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 3);
}

#[tokio::test]
async fn like_on_private_activity_creates_pending_application() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h
        .service
        .swipe(SwipeRequest {
            message: Some("count me in".to_owned()),
            ..like(user, activity.id)
        })
        .await
        .unwrap();

    let application = match result.outcome {
        SwipeOutcome::Applied(a) => a,
        other => panic!("expected Applied, got {other:?}"),
    };
    assert!(application.is_pending());
    assert_eq!(application.host_id, host);
    assert_eq!(application.message.as_deref(), Some("count me in"));
    // 申请不等于准入。
    assert!(!h.admission.can_access_chat(user, activity.id).await.unwrap());
}

#[tokio::test]
async fn approval_gated_activity_also_gets_application() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, true, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    assert!(matches!(result.outcome, SwipeOutcome::Applied(_)));
}

#[tokio::test]
async fn repeated_like_is_idempotent() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let first = h.service.swipe(like(user, activity.id)).await.unwrap();
    let second = h.service.swipe(like(user, activity.id)).await.unwrap();

    let (SwipeOutcome::Matched(a), SwipeOutcome::Matched(b)) = (first.outcome, second.outcome)
    else {
        panic!("expected two Matched outcomes");
    };
    assert_eq!(a.id, b.id);
    assert_eq!(h.matches.count(), 1);
    assert_eq!(h.swipes.count(), 1);
    // 人数只加了一次。
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);
}

#[tokio::test]
async fn repeated_like_on_gated_activity_returns_existing_application() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let first = h.service.swipe(like(user, activity.id)).await.unwrap();
    let second = h.service.swipe(like(user, activity.id)).await.unwrap();

    let (SwipeOutcome::Applied(a), SwipeOutcome::Applied(b)) = (first.outcome, second.outcome)
    else {
        panic!("expected two Applied outcomes");
    };
    assert_eq!(a.id, b.id);
    assert_eq!(h.applications.count(), 1);
}

#[tokio::test]
async fn like_after_pass_updates_direction_and_admits() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let passed = h
        .service
        .swipe(SwipeRequest {
            direction: SwipeDirection::Pass,
            ..like(user, activity.id)
        })
        .await
        .unwrap();
    assert_eq!(passed.outcome, SwipeOutcome::None);

    // 改主意：同一行滑动更新为 Like，照常入场。
    let liked = h.service.swipe(like(user, activity.id)).await.unwrap();
    assert_eq!(liked.swipe.direction, SwipeDirection::Like);
    assert!(matches!(liked.outcome, SwipeOutcome::Matched(_)));
    assert_eq!(h.swipes.count(), 1);
}

#[tokio::test]
async fn simultaneous_first_likes_settle_on_one_match() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let service = Arc::new(h.service);
    let a = tokio::spawn({
        let service = service.clone();
        let request = like(user, activity.id);
        async move { service.swipe(request).await }
    });
    let b = tokio::spawn({
        let service = service.clone();
        let request = like(user, activity.id);
        async move { service.swipe(request).await }
    });

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    let (SwipeOutcome::Matched(ma), SwipeOutcome::Matched(mb)) = (a.outcome, b.outcome) else {
        panic!("expected two Matched outcomes");
    };
    // 输家拿到赢家留下的匹配，不多占名额也不多留行。
    assert_eq!(ma.id, mb.id);
    assert_eq!(h.matches.count(), 1);
    assert_eq!(h.swipes.count(), 1);
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);
}

#[tokio::test]
async fn full_activity_never_over_admits() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 2, 2);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ActivityFull))
    ));
    assert_eq!(h.matches.count(), 0);
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 2);
}

#[tokio::test]
async fn host_cannot_swipe_own_activity() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);

    let result = h.service.swipe(like(host, activity.id)).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::HostCannotSwipe))
    ));
    assert_eq!(h.swipes.count(), 0);
}

#[tokio::test]
async fn swipe_on_cancelled_activity_is_rejected() {
    let host = UserId::from(Uuid::new_v4());
    let mut activity = test_activity(host, false, false, 10, 0);
    activity.status = ActivityStatus::Cancelled;
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ActivityNotActive))
    ));
}

#[tokio::test]
async fn swipe_on_unknown_activity_is_not_found() {
    let h = harness(vec![]);
    let result = h
        .service
        .swipe(SwipeRequest {
            user_id: Uuid::new_v4(),
            activity_id: Uuid::new_v4(),
            direction: SwipeDirection::Like,
            message: None,
        })
        .await;
    assert!(matches!(
        result,
        Err(ApplicationError::Domain(DomainError::ActivityNotFound))
    ));
}

#[tokio::test]
async fn new_match_broadcasts_to_room() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());
    h.users.insert(domain::UserSummary {
        id: user,
        username: "lena".to_owned(),
        avatar_url: None,
    });

    h.service.swipe(like(user, activity.id)).await.unwrap();

    let events = h.broadcaster.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].activity_id, activity.id);
    match &events[0].payload {
        RoomEventPayload::NewMatch { user: summary, .. } => {
            assert_eq!(summary.username, "lena");
        }
        other => panic!("expected NewMatch, got {other:?}"),
    }
}

#[tokio::test]
async fn approving_application_admits_through_capacity_guard() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let applicant = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(applicant, activity.id)).await.unwrap();
    let SwipeOutcome::Applied(application) = result.outcome else {
        panic!("expected Applied");
    };
    assert!(!h.admission.can_access_chat(applicant, activity.id).await.unwrap());

    let reviewed = h
        .service
        .review_application(ReviewApplicationRequest {
            application_id: application.id.into(),
            reviewer_id: host.into(),
            approve: true,
            host_message: Some("see you there".to_owned()),
        })
        .await
        .unwrap();

    assert_eq!(reviewed.status, domain::ApplicationStatus::Approved);
    assert!(reviewed.reviewed_at.is_some());
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);
    // 批准后立即获得准入，无缓存窗口。
    assert!(h.admission.can_access_chat(applicant, activity.id).await.unwrap());
}

#[tokio::test]
async fn rejecting_application_grants_no_admission() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let applicant = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(applicant, activity.id)).await.unwrap();
    let SwipeOutcome::Applied(application) = result.outcome else {
        panic!("expected Applied");
    };

    let reviewed = h
        .service
        .review_application(ReviewApplicationRequest {
            application_id: application.id.into(),
            reviewer_id: host.into(),
            approve: false,
            host_message: None,
        })
        .await
        .unwrap();

    assert_eq!(reviewed.status, domain::ApplicationStatus::Rejected);
    assert_eq!(h.matches.count(), 0);
    assert!(!h.admission.can_access_chat(applicant, activity.id).await.unwrap());
}

#[tokio::test]
async fn only_host_may_review_application() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let applicant = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(applicant, activity.id)).await.unwrap();
    let SwipeOutcome::Applied(application) = result.outcome else {
        panic!("expected Applied");
    };

    let outcome = h
        .service
        .review_application(ReviewApplicationRequest {
            application_id: application.id.into(),
            reviewer_id: applicant.into(),
            approve: true,
            host_message: None,
        })
        .await;
    assert!(matches!(
        outcome,
        Err(ApplicationError::Domain(DomainError::NotApplicationHost))
    ));
}

#[tokio::test]
async fn approving_when_activity_filled_up_keeps_application_pending() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, true, false, 1, 0);
    let h = harness(vec![activity.clone()]);
    let applicant = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(applicant, activity.id)).await.unwrap();
    let SwipeOutcome::Applied(application) = result.outcome else {
        panic!("expected Applied");
    };

    // 审批前活动被占满。
    let other = UserId::from(Uuid::new_v4());
    h.matches.admit(other, activity.id, Utc::now()).await.unwrap();

    let outcome = h
        .service
        .review_application(ReviewApplicationRequest {
            application_id: application.id.into(),
            reviewer_id: host.into(),
            approve: true,
            host_message: None,
        })
        .await;

    assert!(matches!(
        outcome,
        Err(ApplicationError::Domain(DomainError::ActivityFull))
    ));
    let stored = h
        .applications
        .find_by_id(application.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_pending());
}

#[tokio::test]
async fn update_match_broadcasts_match_updated() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };

    let updated = h
        .service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Rejected,
        })
        .await
        .unwrap();
    assert_eq!(updated.status, MatchStatus::Rejected);

    let events = h.broadcaster.events();
    assert!(matches!(
        events.last().unwrap().payload,
        RoomEventPayload::MatchUpdated { .. }
    ));
}

#[tokio::test]
async fn rejecting_active_match_releases_the_seat() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);

    h.service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Rejected,
        })
        .await
        .unwrap();

    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 0);
    assert!(!h.admission.can_access_chat(user, activity.id).await.unwrap());
}

#[tokio::test]
async fn reapproving_rejected_match_takes_a_seat_again() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };

    h.service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Rejected,
        })
        .await
        .unwrap();

    let reapproved = h
        .service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Approved,
        })
        .await
        .unwrap();

    assert_eq!(reapproved.status, MatchStatus::Approved);
    assert!(reapproved.is_active_participant());
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);
    assert!(h.admission.can_access_chat(user, activity.id).await.unwrap());
}

#[tokio::test]
async fn reapproval_is_blocked_when_activity_filled_up() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 1, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };

    h.service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Rejected,
        })
        .await
        .unwrap();

    // 释放出来的唯一名额被别人占走。
    let other = UserId::from(Uuid::new_v4());
    h.matches.admit(other, activity.id, Utc::now()).await.unwrap();

    let outcome = h
        .service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: host.into(),
            status: MatchStatus::Approved,
        })
        .await;

    assert!(matches!(
        outcome,
        Err(ApplicationError::Domain(DomainError::ActivityFull))
    ));
    let stored = h.matches.find_by_id(match_record.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MatchStatus::Rejected);
}

#[tokio::test]
async fn stranger_cannot_update_match() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };

    let outcome = h
        .service
        .update_match(UpdateMatchRequest {
            match_id: match_record.id.into(),
            caller_id: Uuid::new_v4(),
            status: MatchStatus::Rejected,
        })
        .await;
    assert!(matches!(
        outcome,
        Err(ApplicationError::Domain(DomainError::OperationNotAllowed))
    ));
}

#[tokio::test]
async fn leaving_releases_seat_and_revokes_admission() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    let result = h.service.swipe(like(user, activity.id)).await.unwrap();
    let SwipeOutcome::Matched(match_record) = result.outcome else {
        panic!("expected Matched");
    };
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 1);

    let left = h
        .service
        .leave_activity(match_record.id.into(), user.into())
        .await
        .unwrap();
    assert!(left.left_at.is_some());
    assert_eq!(h.activities.get(activity.id).unwrap().current_participants, 0);
    assert!(!h.admission.can_access_chat(user, activity.id).await.unwrap());
    // 记录保留，可供历史查询。
    assert!(h.matches.find_by_id(match_record.id).await.unwrap().is_some());
}

#[tokio::test]
async fn list_matches_embeds_activity() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    let user = UserId::from(Uuid::new_v4());

    h.service.swipe(like(user, activity.id)).await.unwrap();

    let matches = h.service.list_matches(user.into()).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].activity.id, activity.id);
}

#[tokio::test]
async fn participants_include_host_and_active_members_only() {
    let host = UserId::from(Uuid::new_v4());
    let activity = test_activity(host, false, false, 10, 0);
    let h = harness(vec![activity.clone()]);
    h.users.insert(domain::UserSummary {
        id: host,
        username: "host".to_owned(),
        avatar_url: None,
    });

    let member = UserId::from(Uuid::new_v4());
    h.service.swipe(like(member, activity.id)).await.unwrap();

    // 一个已离开的成员不应出现。
    let gone = ActivityMatch {
        left_at: Some(Utc::now()),
        ..ActivityMatch::approved(
            MatchId::from(Uuid::new_v4()),
            UserId::from(Uuid::new_v4()),
            activity.id,
            Utc::now(),
        )
    };
    h.matches.insert(gone);

    let participants = h.service.list_participants(activity.id.into()).await.unwrap();
    assert_eq!(participants.len(), 2);
    assert_eq!(participants[0].id, host);
}
