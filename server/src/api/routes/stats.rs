//! Aggregate broker counters endpoint

use axum::Json;
use axum::extract::State;

use crate::api::ApiState;
use crate::broker::StatsSnapshot;

/// Aggregate counters across all topics and sessions
pub async fn stats(State(state): State<ApiState>) -> Json<StatsSnapshot> {
    Json(state.broker.stats())
}
