//! Broker error types

use thiserror::Error;

/// Error type for broker operations
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Topic already exists under this name
    #[error("topic '{0}' already exists")]
    TopicExists(String),

    /// Operation refers to an unknown topic
    #[error("topic '{0}' not found")]
    TopicNotFound(String),

    /// Malformed or out-of-range request field
    #[error("{0}")]
    BadRequest(String),

    /// Session already holds a subscription for this topic
    #[error("already subscribed to topic '{0}'")]
    DuplicateSubscription(String),

    /// Rejected because the broker is shutting down
    #[error("server is shutting down")]
    ShuttingDown,
}

impl BrokerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}
