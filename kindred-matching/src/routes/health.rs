use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use kindred_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

fn check(name: &str, result: Result<(), String>) -> HealthCheck {
    match result {
        Ok(()) => HealthCheck {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(message) => HealthCheck {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message),
        },
    }
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let redis = state.redis.ping().await.map_err(|e| e.to_string());
    let rabbitmq = if state.rabbitmq.is_connected() {
        Ok(())
    } else {
        Err("connection closed".to_string())
    };

    Json(
        HealthResponse::healthy("kindred-matching", env!("CARGO_PKG_VERSION"))
            .with_checks(vec![check("redis", redis), check("rabbitmq", rabbitmq)]),
    )
}

pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.render()
}
