//! WebSocket frame shapes
//!
//! One JSON object per message, dispatched on the `type` tag. Unknown
//! types, missing fields and wrong field types all fail deserialization and
//! are answered with a `BAD_REQUEST` error frame.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::{BrokerError, Message};

/// Fresh RFC 3339 timestamp for outbound frames
fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// CLIENT → SERVER
// ============================================================================

/// Message body of a `publish` frame
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub payload: Value,
}

/// Inbound frame, tagged by `type`
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        topic: String,
        client_id: String,
        /// Parsed wide so a negative value can be answered with a typed
        /// error instead of an opaque deserialization failure
        last_n: Option<i64>,
        request_id: Option<String>,
    },
    Unsubscribe {
        topic: String,
        client_id: String,
        request_id: Option<String>,
    },
    Publish {
        topic: String,
        message: InboundMessage,
        request_id: Option<String>,
    },
    Ping {
        request_id: Option<String>,
    },
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Subscribe { request_id, .. }
            | Self::Unsubscribe { request_id, .. }
            | Self::Publish { request_id, .. }
            | Self::Ping { request_id } => request_id.as_deref(),
        }
    }
}

// ============================================================================
// SERVER → CLIENT
// ============================================================================

/// Wire error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    BadRequest,
    TopicNotFound,
    SlowConsumer,
    ServiceUnavailable,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// Message body of an `event` frame
#[derive(Debug, Serialize)]
pub struct EventMessage {
    pub id: String,
    pub payload: Value,
    pub ts: String,
}

/// Outbound frame, tagged by `type`
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Ack {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        status: &'static str,
        ts: String,
    },
    Event {
        topic: String,
        message: EventMessage,
        ts: String,
    },
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        error: ErrorBody,
        ts: String,
    },
    Info {
        msg: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        topic: Option<String>,
        ts: String,
    },
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        ts: String,
    },
}

impl ServerFrame {
    pub fn ack(request_id: Option<String>, topic: Option<String>) -> Self {
        Self::Ack {
            request_id,
            topic,
            status: "ok",
            ts: now_rfc3339(),
        }
    }

    pub fn event(topic: &str, message: &Message) -> Self {
        Self::Event {
            topic: topic.to_string(),
            message: EventMessage {
                id: message.id.clone(),
                payload: message.payload.clone(),
                ts: message.ts_rfc3339(),
            },
            ts: now_rfc3339(),
        }
    }

    pub fn error(request_id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            request_id,
            error: ErrorBody {
                code,
                message: message.into(),
            },
            ts: now_rfc3339(),
        }
    }

    pub fn info(msg: impl Into<String>, topic: Option<String>) -> Self {
        Self::Info {
            msg: msg.into(),
            topic,
            ts: now_rfc3339(),
        }
    }

    pub fn pong(request_id: Option<String>) -> Self {
        Self::Pong {
            request_id,
            ts: now_rfc3339(),
        }
    }

    /// Map a broker rejection onto its wire error frame
    pub fn from_broker_error(request_id: Option<String>, err: &BrokerError) -> Self {
        let code = match err {
            BrokerError::TopicNotFound(_) => ErrorCode::TopicNotFound,
            BrokerError::ShuttingDown => ErrorCode::ServiceUnavailable,
            BrokerError::TopicExists(_)
            | BrokerError::BadRequest(_)
            | BrokerError::DuplicateSubscription(_) => ErrorCode::BadRequest,
        };
        Self::error(request_id, code, err.to_string())
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("server frames serialize")
    }
}
