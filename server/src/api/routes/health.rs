//! Health check endpoint

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::api::ApiState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub version: &'static str,
}

/// Health check endpoint
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let status = if state.broker.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(HealthResponse {
        status,
        uptime_seconds: state.broker.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION"),
    })
}
