//! WebSocket endpoint
//!
//! Admission happens before the protocol starts: an unadmitted socket is
//! closed with 4401 without a single frame being exchanged.

use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;

use crate::api::ApiState;
use crate::api::auth::credential_ok;
use crate::core::constants::CLOSE_UNAUTHORIZED;
use crate::session;

/// Upgrade handler for `/ws` and `/ws/`
pub async fn ws_handler(
    State(state): State<ApiState>,
    headers: HeaderMap,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> Response {
    let admitted = credential_ok(&headers, &uri, &state.api_keys);
    let broker = state.broker;

    ws.on_upgrade(move |socket| async move {
        if !admitted {
            tracing::debug!("WebSocket admission failed");
            session::reject(socket, CLOSE_UNAUTHORIZED).await;
            return;
        }
        session::run(socket, broker).await;
    })
}
