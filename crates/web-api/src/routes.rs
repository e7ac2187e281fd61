use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use application::{
    MatchWithActivity, ReviewApplicationRequest, SendMessageRequest, SwipeOutcome, SwipeRequest,
    UpdateMatchRequest,
};
use domain::{
    ActivityApplication, ActivityMatch, ChatMessageWithSender, MatchStatus, MessageType, Swipe,
    SwipeDirection, UserSummary,
};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::ws_connection::WsConnection;

#[derive(Debug, Deserialize)]
struct SwipePayload {
    direction: SwipeDirection,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum SwipeOutcomeLabel {
    None,
    Applied,
    Matched,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwipeResponse {
    swipe: Swipe,
    outcome: SwipeOutcomeLabel,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    match_record: Option<ActivityMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    application: Option<ActivityApplication>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendMessagePayload {
    message: String,
    message_type: Option<MessageType>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<u32>,
    before: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct UpdateMatchPayload {
    status: MatchStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewApplicationPayload {
    approve: bool,
    host_message: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/activities/{activity_id}/swipe", post(swipe))
        .route(
            "/activities/{activity_id}/chat",
            get(get_history).post(send_message),
        )
        .route(
            "/activities/{activity_id}/participants",
            get(list_participants),
        )
        .route("/matches", get(list_matches))
        .route("/matches/{match_id}", patch(update_match))
        .route("/matches/{match_id}/leave", post(leave_activity))
        .route("/applications/{application_id}", patch(review_application))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn swipe(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(activity_id): Path<Uuid>,
    Json(payload): Json<SwipePayload>,
) -> Result<(StatusCode, Json<SwipeResponse>), ApiError> {
    let result = state
        .matching_service
        .swipe(SwipeRequest {
            user_id,
            activity_id,
            direction: payload.direction,
            message: payload.message,
        })
        .await?;

    let response = match result.outcome {
        SwipeOutcome::None => SwipeResponse {
            swipe: result.swipe,
            outcome: SwipeOutcomeLabel::None,
            match_record: None,
            application: None,
        },
        SwipeOutcome::Matched(match_record) => SwipeResponse {
            swipe: result.swipe,
            outcome: SwipeOutcomeLabel::Matched,
            match_record: Some(match_record),
            application: None,
        },
        SwipeOutcome::Applied(application) => SwipeResponse {
            swipe: result.swipe,
            outcome: SwipeOutcomeLabel::Applied,
            match_record: None,
            application: Some(application),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_history(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(activity_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessageWithSender>>, ApiError> {
    let items = state
        .chat_service
        .get_history(user_id, activity_id, query.limit, query.before)
        .await?;

    Ok(Json(items))
}

async fn send_message(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(activity_id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<ChatMessageWithSender>), ApiError> {
    let message = state
        .chat_service
        .send_message(SendMessageRequest {
            activity_id,
            sender_id: user_id,
            content: payload.message,
            message_type: payload.message_type.unwrap_or(MessageType::Text),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

async fn list_participants(
    State(state): State<AppState>,
    AuthenticatedUser(_user_id): AuthenticatedUser,
    Path(activity_id): Path<Uuid>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    let participants = state.matching_service.list_participants(activity_id).await?;
    Ok(Json(participants))
}

async fn list_matches(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<MatchWithActivity>>, ApiError> {
    let matches = state.matching_service.list_matches(user_id).await?;
    Ok(Json(matches))
}

async fn update_match(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<UpdateMatchPayload>,
) -> Result<Json<ActivityMatch>, ApiError> {
    let updated = state
        .matching_service
        .update_match(UpdateMatchRequest {
            match_id,
            caller_id: user_id,
            status: payload.status,
        })
        .await?;

    Ok(Json(updated))
}

async fn leave_activity(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(match_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.matching_service.leave_activity(match_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn review_application(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<ReviewApplicationPayload>,
) -> Result<Json<ActivityApplication>, ApiError> {
    let application = state
        .matching_service
        .review_application(ReviewApplicationRequest {
            application_id,
            reviewer_id: user_id,
            approve: payload.approve,
            host_message: payload.host_message,
        })
        .await?;

    Ok(Json(application))
}

async fn websocket_upgrade(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    Ok(ws.on_upgrade(move |socket| WsConnection::new(state, user_id).run(socket)))
}
