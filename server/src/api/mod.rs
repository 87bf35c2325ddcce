//! HTTP/WebSocket surface

pub mod auth;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use crate::broker::Broker;
use crate::core::ShutdownService;

pub use server::ApiServer;

/// Shared state for all API endpoints
#[derive(Clone)]
pub struct ApiState {
    pub broker: Arc<Broker>,
    pub shutdown: ShutdownService,
    pub api_keys: Arc<HashSet<String>>,
}

/// Isolated state for handler tests
#[cfg(test)]
pub(crate) fn test_state() -> ApiState {
    use crate::core::config::BrokerConfig;

    let config = BrokerConfig::default();
    let api_keys = Arc::new(config.api_keys.clone());
    let broker = Arc::new(Broker::new(config));
    let shutdown = ShutdownService::new(Arc::clone(&broker));
    ApiState {
        broker,
        shutdown,
        api_keys,
    }
}
