//! HTTP middleware (CORS, 404 handler)

use axum::http::{Method, StatusCode, header};
use axum::response::IntoResponse;
use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS: the broker is credentialed by API key, not cookies
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-api-key")])
}

/// Handle 404 Not Found
pub async fn handle_404() -> impl IntoResponse {
    StatusCode::NOT_FOUND
}
