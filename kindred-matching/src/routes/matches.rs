use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use kindred_shared::errors::{AppError, AppResult};
use kindred_shared::types::api::ApiResponse;
use kindred_shared::types::auth::AuthUser;

use crate::matching::lifecycle::{OutcomeReceipt, OutcomeSubmission};
use crate::models::{Decision, MatchView, OutcomeTag, PassReasonKind, WeeklyMatch};
use crate::routes::validate_body;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondPayload {
    pub response: Decision,
    pub pass_reason: Option<PassReasonKind>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OutcomePayload {
    pub date_happened: bool,
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: Option<i32>,
    pub would_meet_again: bool,
    #[validate(length(max = 2000, message = "notes are limited to 2000 characters"))]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<OutcomeTag>,
}

impl From<OutcomePayload> for OutcomeSubmission {
    fn from(payload: OutcomePayload) -> Self {
        Self {
            date_happened: payload.date_happened,
            rating: payload.rating,
            would_meet_again: payload.would_meet_again,
            notes: payload.notes.filter(|n| !n.trim().is_empty()),
            tags: payload.tags,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadMessagePayload {
    pub recipient_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ChatAccess {
    pub match_id: Uuid,
    pub partner_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct EmailScheduled {
    pub due_at: DateTime<Utc>,
}

fn view(m: &WeeklyMatch, viewer: Uuid) -> AppResult<MatchView> {
    m.view_for(viewer)
        .ok_or_else(|| AppError::internal("participant lost access to own match"))
}

// ---------------------------------------------------------------------------
// GET /matches/current
// ---------------------------------------------------------------------------

pub async fn current_match(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Option<MatchView>>>> {
    let current = state.lifecycle.current_match(user.id, Utc::now()).await?;
    Ok(Json(ApiResponse::ok(current)))
}

// ---------------------------------------------------------------------------
// POST /matches/:id/respond
// ---------------------------------------------------------------------------

pub async fn respond(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<RespondPayload>,
) -> AppResult<Json<ApiResponse<MatchView>>> {
    let updated = state
        .lifecycle
        .respond(match_id, user.id, payload.response, payload.pass_reason, Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(view(&updated, user.id)?)))
}

// ---------------------------------------------------------------------------
// POST /matches/:id/outcome
// ---------------------------------------------------------------------------

pub async fn submit_outcome(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<OutcomePayload>,
) -> AppResult<Json<ApiResponse<OutcomeReceipt>>> {
    validate_body(&payload)?;

    let receipt = state
        .lifecycle
        .submit_outcome(match_id, user.id, payload.into(), Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(receipt)))
}

// ---------------------------------------------------------------------------
// GET /matches/:id/chat-access
// ---------------------------------------------------------------------------

pub async fn chat_access(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChatAccess>>> {
    let m = state.lifecycle.ensure_chat_open(match_id, user.id, Utc::now()).await?;
    let partner_id = m
        .partner_of(user.id)
        .ok_or_else(|| AppError::internal("participant without a partner"))?;
    Ok(Json(ApiResponse::ok(ChatAccess {
        match_id: m.id,
        partner_id,
        expires_at: m.expires_at,
    })))
}

// ---------------------------------------------------------------------------
// POST /matches/:id/unread-message
// ---------------------------------------------------------------------------

pub async fn unread_message(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<UnreadMessagePayload>,
) -> AppResult<Json<ApiResponse<EmailScheduled>>> {
    let due_at = state
        .lifecycle
        .schedule_unread_email(match_id, user.id, payload.recipient_id, Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(EmailScheduled { due_at })))
}
