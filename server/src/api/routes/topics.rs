//! Topic CRUD endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::ApiState;
use crate::api::types::ApiError;
use crate::broker::TopicSummary;

/// Build topic API routes (registered with and without trailing slash)
pub fn routes(state: ApiState) -> Router<()> {
    Router::new()
        .route("/topics", get(list_topics).post(create_topic))
        .route("/topics/", get(list_topics).post(create_topic))
        .route("/topics/{name}", delete(delete_topic))
        .route("/topics/{name}/", delete(delete_topic))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
    /// Parsed wide so out-of-range values produce a typed 400 rather than a
    /// deserialization failure
    pub ring_size: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateTopicResponse {
    pub name: String,
    pub ring_size: usize,
}

#[derive(Debug, Serialize)]
pub struct ListTopicsResponse {
    pub topics: Vec<TopicSummary>,
}

/// Create a topic
pub async fn create_topic(
    State(state): State<ApiState>,
    Json(body): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<CreateTopicResponse>), ApiError> {
    let ring_size = state.broker.create_topic(&body.name, body.ring_size)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateTopicResponse {
            name: body.name,
            ring_size,
        }),
    ))
}

/// List topics with their counters
pub async fn list_topics(State(state): State<ApiState>) -> Json<ListTopicsResponse> {
    Json(ListTopicsResponse {
        topics: state.broker.list_topics(),
    })
}

/// Delete a topic, notifying and detaching every subscriber
pub async fn delete_topic(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.broker.delete_topic(&name)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    #[tokio::test]
    async fn test_create_topic_returns_201_with_defaults() {
        let state = test_state();
        let response = create_topic(
            State(state.clone()),
            Json(CreateTopicRequest {
                name: "orders".to_string(),
                ring_size: None,
            }),
        )
        .await;
        assert!(response.is_ok());

        let listing = state.broker.list_topics();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].ring_buffer_size, 100);
    }

    #[tokio::test]
    async fn test_create_topic_bad_name_is_400() {
        let state = test_state();
        let err = create_topic(
            State(state),
            Json(CreateTopicRequest {
                name: "bad name!".to_string(),
                ring_size: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_topic_bad_ring_size_is_400() {
        let state = test_state();
        let err = create_topic(
            State(state),
            Json(CreateTopicRequest {
                name: "orders".to_string(),
                ring_size: Some(-1),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_duplicate_topic_is_409() {
        let state = test_state();
        state.broker.create_topic("orders", None).unwrap();
        let err = create_topic(
            State(state),
            Json(CreateTopicRequest {
                name: "orders".to_string(),
                ring_size: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_topic_204_then_404() {
        let state = test_state();
        state.broker.create_topic("orders", None).unwrap();

        let status = delete_topic(State(state.clone()), Path("orders".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = delete_topic(State(state), Path("orders".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_rejected_while_shutting_down() {
        let state = test_state();
        state.broker.begin_shutdown();
        let err = create_topic(
            State(state),
            Json(CreateTopicRequest {
                name: "orders".to_string(),
                ring_size: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
