//! Shared API types
//!
//! Error handling for the REST surface: every failure renders as a
//! `{error, code, message}` JSON body with the matching status code.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::broker::BrokerError;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { message: String },
    NotFound { message: String },
    Unauthorized { message: String },
    Conflict { message: String },
    ServiceUnavailable { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        let message = err.to_string();
        match err {
            BrokerError::TopicExists(_) => Self::Conflict { message },
            BrokerError::TopicNotFound(_) => Self::NotFound { message },
            BrokerError::BadRequest(_) | BrokerError::DuplicateSubscription(_) => {
                Self::BadRequest { message }
            }
            BrokerError::ShuttingDown => Self::ServiceUnavailable { message },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_type, code, message) = match self {
            Self::BadRequest { message } => ("bad_request", "BAD_REQUEST", message),
            Self::NotFound { message } => ("not_found", "TOPIC_NOT_FOUND", message),
            Self::Unauthorized { message } => ("unauthorized", "API_KEY_INVALID", message),
            Self::Conflict { message } => ("conflict", "TOPIC_EXISTS", message),
            Self::ServiceUnavailable { message } => {
                ("service_unavailable", "SERVICE_UNAVAILABLE", message)
            }
        };
        (
            status,
            Json(serde_json::json!({
                "error": error_type,
                "code": code,
                "message": message
            })),
        )
            .into_response()
    }
}
