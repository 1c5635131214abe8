use std::sync::Arc;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::HeaderName,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::proxy::ProxyHandler;

mod handlers;
mod types;

pub use handlers::{health_check, issue_token, proxy_request, static_map, SERVICE_NAME};
pub use types::{ErrorResponse, HealthResponse, TokenResponse};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

pub fn create_router(handler: Arc<ProxyHandler>) -> Router {
    let body_limit = handler.state().config.max_body_size_bytes;

    Router::new()
        .route("/api/proxy", post(proxy_request))
        .route("/api/token", get(issue_token).post(issue_token))
        .route("/api/static-map", get(static_map))
        .route("/health", get(health_check))
        .with_state(handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(set_request_id))
        .layer(TraceLayer::new_for_http())
}

async fn set_request_id(
    mut request: axum::http::Request<Body>,
    next: Next,
) -> axum::response::Response {
    let request_id = Uuid::new_v4().to_string();
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;

    if !response.headers().contains_key(&REQUEST_ID_HEADER) {
        if let Ok(header_value) = axum::http::HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(REQUEST_ID_HEADER.clone(), header_value);
        }
    }

    response
}
