//! Weekly curated matching: one AI-scored introduction per member per week,
//! a Monday-to-Friday response window, and post-date feedback.

pub mod clients;
pub mod config;
pub mod delayed;
pub mod error;
pub mod events;
pub mod jobs;
pub mod matching;
pub mod models;
pub mod ports;
pub mod profiles;
pub mod routes;
pub mod scheduler;
pub mod schema;
pub mod store;
pub mod week;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;

use kindred_shared::clients::rabbitmq::RabbitMQClient;
use kindred_shared::clients::redis::RedisClient;

use config::AppConfig;
use jobs::Jobs;
use matching::lifecycle::MatchLifecycle;
use profiles::ProfileService;

pub struct AppState {
    pub config: AppConfig,
    pub redis: RedisClient,
    pub rabbitmq: RabbitMQClient,
    pub jobs: Arc<Jobs>,
    pub lifecycle: Arc<MatchLifecycle>,
    pub profiles: ProfileService,
    pub metrics: PrometheusHandle,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::prometheus_metrics))
        // Member endpoints
        .route("/matches/current", get(routes::matches::current_match))
        .route("/matches/:id/respond", post(routes::matches::respond))
        .route("/matches/:id/outcome", post(routes::matches::submit_outcome))
        .route("/matches/:id/chat-access", get(routes::matches::chat_access))
        .route("/matches/:id/unread-message", post(routes::matches::unread_message))
        .route("/profiles/me/vacation", put(routes::profiles::set_vacation))
        .route("/profiles/me/narrative", put(routes::profiles::update_narrative))
        // Operator endpoints (admin role)
        .route("/internal/runs/weekly", post(routes::internal::trigger_weekly_run))
        .route("/internal/runs/expire-sweep", post(routes::internal::trigger_expire_sweep))
        .route("/internal/runs/notifications", post(routes::internal::trigger_notifications))
        .route("/internal/metrics/second-dates", get(routes::internal::second_date_metric))
        .route("/internal/profiles/:id/photo-status", post(routes::profiles::set_photo_status))
        .with_state(state)
}
