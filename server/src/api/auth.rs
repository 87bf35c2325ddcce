//! Credential admission
//!
//! Both surfaces accept the same opaque key, presented either as the
//! `X-API-Key` header or the `api_key` query parameter, checked against the
//! configured allow-list. REST misses get a 401 body; the WebSocket closes
//! with 4401 before any frame.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::types::ApiError;

/// Header carrying the credential
pub const API_KEY_HEADER: &str = "x-api-key";

/// Query parameter carrying the credential
pub const API_KEY_PARAM: &str = "api_key";

/// Shared state for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub api_keys: Arc<HashSet<String>>,
}

/// Extract the presented credential, header first, then query string
fn presented_key(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    if let Some(value) = headers.get(API_KEY_HEADER)
        && let Ok(key) = value.to_str()
    {
        return Some(key.to_string());
    }
    let query = uri.query()?;
    url_param(query, API_KEY_PARAM)
}

/// Minimal query-string lookup; values are opaque tokens so percent
/// decoding is intentionally not applied.
fn url_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// True when the request carries an admitted credential
pub fn credential_ok(headers: &HeaderMap, uri: &Uri, api_keys: &HashSet<String>) -> bool {
    match presented_key(headers, uri) {
        Some(key) => api_keys.contains(&key),
        None => false,
    }
}

/// Middleware guarding the REST surface
pub async fn require_api_key(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Response {
    if credential_ok(req.headers(), req.uri(), &state.api_keys) {
        next.run(req).await
    } else {
        ApiError::unauthorized("Missing or invalid API key").into_response()
    }
}
