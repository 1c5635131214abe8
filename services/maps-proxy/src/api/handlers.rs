use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{error, info, instrument, warn};

use crate::proxy::{
    ProxyError, ProxyHandler, ResponseEnvelope, StaticMapQuery, FALLBACK_ERROR_MESSAGE,
};

use super::types::{ErrorResponse, HealthResponse, TokenResponse};

pub const SERVICE_NAME: &str = "maps-proxy";

#[instrument(skip_all)]
pub async fn proxy_request(
    State(handler): State<Arc<ProxyHandler>>,
    body: Result<Bytes, BytesRejection>,
) -> ResponseEnvelope {
    match body {
        Ok(body) => handler.handle_json(&body).await,
        Err(rejection) => handler.reject(map_body_rejection(rejection)),
    }
}

fn map_body_rejection(rejection: BytesRejection) -> ProxyError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge(rejection.body_text())
    } else {
        ProxyError::InvalidJson(rejection.body_text())
    }
}

#[instrument(skip_all)]
pub async fn issue_token(
    State(handler): State<Arc<ProxyHandler>>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ErrorResponse>)> {
    match handler.bearer_token().await {
        Ok(token) => {
            info!("bearer token issued");
            Ok(Json(TokenResponse { token }))
        }
        Err(err) => {
            error!(code = err.code(), error = %err, "token issuance failed");
            let message = err.to_string();
            let message = if message.trim().is_empty() {
                FALLBACK_ERROR_MESSAGE.to_string()
            } else {
                message
            };
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(message)),
            ))
        }
    }
}

#[instrument(skip_all)]
pub async fn static_map(
    State(handler): State<Arc<ProxyHandler>>,
    Query(query): Query<StaticMapQuery>,
) -> Response {
    match handler.static_map(&query).await {
        Ok(image) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, image.content_type)],
            image.body,
        )
            .into_response(),
        Err(err) => {
            warn!(status = err.status().as_u16(), error = %err, "static map request failed");
            (
                err.status(),
                Json(ErrorResponse::new(err.to_string()).with_code(err.error_code())),
            )
                .into_response()
        }
    }
}

#[instrument(skip_all)]
pub async fn health_check(State(handler): State<Arc<ProxyHandler>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        auth: handler.state().config.auth_summary().to_string(),
    })
}
