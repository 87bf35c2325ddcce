//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tokio::net::TcpListener;

use super::auth::{AuthState, require_api_key};
use super::routes::{health, shutdown, stats, topics, ws};
use super::{ApiState, middleware};
use crate::core::CoreApp;

/// Assemble the full router: WebSocket endpoint plus credentialed REST.
///
/// The WebSocket route performs its own admission so it can close with 4401
/// instead of answering 401; every REST route sits behind the API key
/// middleware.
pub fn build_router(state: ApiState) -> Router {
    let auth_state = AuthState {
        api_keys: Arc::clone(&state.api_keys),
    };

    let ops_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/", get(health::health))
        .route("/stats", get(stats::stats))
        .route("/stats/", get(stats::stats))
        .route("/shutdown", post(shutdown::shutdown))
        .route("/shutdown/", post(shutdown::shutdown))
        .with_state(state.clone());
    let rest_routes = topics::routes(state.clone())
        .merge(ops_routes)
        .layer(from_fn_with_state(auth_state, require_api_key));

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/ws/", get(ws::ws_handler))
        .with_state(state);

    ws_routes
        .merge(rest_routes)
        .fallback(middleware::handle_404)
        .layer(middleware::cors())
}

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Serve until graceful shutdown completes; returns CoreApp for the
    /// final drain join.
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        let shutdown = app.shutdown.clone();
        let state = ApiState {
            broker: Arc::clone(&app.broker),
            shutdown: shutdown.clone(),
            api_keys: Arc::new(app.config.broker.api_keys.clone()),
        };
        let router = build_router(state);

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            api_keys = app.config.broker.api_keys.len(),
            "Broker listening"
        );

        // The listener keeps answering REST (health, stats) through the
        // drain and stops once the drain reports done.
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait_drained())
            .await?;

        Ok(app)
    }
}
