//! Operator endpoints: manual job triggers and the success metric.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use kindred_shared::errors::AppResult;
use kindred_shared::middleware::AdminUser;
use kindred_shared::types::api::ApiResponse;

use crate::matching::lifecycle::{DeliveryReport, SecondDateMetric};
use crate::matching::orchestrator::RunSummary;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SweepResult {
    pub expired: usize,
}

/// POST /internal/runs/weekly
pub async fn trigger_weekly_run(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<RunSummary>>> {
    tracing::info!(admin_id = %admin.id, "weekly run triggered manually");
    let summary = state.jobs.weekly_run(Utc::now()).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// POST /internal/runs/expire-sweep
pub async fn trigger_expire_sweep(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SweepResult>>> {
    tracing::info!(admin_id = %admin.id, "expire sweep triggered manually");
    let expired = state.jobs.expire_sweep(Utc::now()).await?;
    Ok(Json(ApiResponse::ok(SweepResult { expired })))
}

/// POST /internal/runs/notifications
pub async fn trigger_notifications(
    AdminUser(_admin): AdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<DeliveryReport>>> {
    let report = state.jobs.drain_notifications(Utc::now()).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// GET /internal/metrics/second-dates
pub async fn second_date_metric(
    AdminUser(_admin): AdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SecondDateMetric>>> {
    let metric = state.lifecycle.second_date_metric().await?;
    Ok(Json(ApiResponse::ok(metric)))
}
