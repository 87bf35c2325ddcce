//! Shutdown trigger endpoint

use axum::extract::State;
use axum::http::StatusCode;

use crate::api::ApiState;
use crate::api::types::ApiError;

/// Begin graceful shutdown; the drain runs asynchronously
pub async fn shutdown(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    if !state.shutdown.trigger() {
        return Err(ApiError::conflict("shutdown already in progress"));
    }
    tracing::info!("Shutdown requested via REST");
    Ok(StatusCode::ACCEPTED)
}
