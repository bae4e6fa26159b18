use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::AdminUser;
use kindred_shared::types::api::ApiResponse;
use kindred_shared::types::auth::AuthUser;

use crate::models::{PhotoStatus, UserProfile};
use crate::routes::validate_body;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VacationPayload {
    pub on: bool,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NarrativePayload {
    #[validate(length(min = 1, message = "bio is required"))]
    pub bio: String,
    #[validate(length(min = 1, message = "lookingFor is required"))]
    pub looking_for: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoStatusPayload {
    pub status: PhotoStatus,
}

// --- PUT /profiles/me/vacation ---

pub async fn set_vacation(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<VacationPayload>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let updated = state
        .profiles
        .set_vacation(user.id, payload.on, payload.until, Utc::now())
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

// --- PUT /profiles/me/narrative ---

pub async fn update_narrative(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NarrativePayload>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    validate_body(&payload)?;
    let updated = state
        .profiles
        .update_narrative(user.id, &payload.bio, &payload.looking_for)
        .await?;
    Ok(Json(ApiResponse::ok(updated)))
}

// --- POST /internal/profiles/:id/photo-status ---

pub async fn set_photo_status(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(profile_id): Path<Uuid>,
    Json(payload): Json<PhotoStatusPayload>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    tracing::info!(admin_id = %admin.id, %profile_id, status = %payload.status, "photo review recorded");
    let updated = state.profiles.set_photo_status(profile_id, payload.status).await?;
    Ok(Json(ApiResponse::ok(updated)))
}
