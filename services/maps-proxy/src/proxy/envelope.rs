use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::error::{ErrorCode, ForwardFailure, ProxyError};
use super::upstream::UpstreamResponse;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMeta {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub duration_ms: u64,
    pub url: String,
}

/// Uniform response shape returned for every proxied request, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub meta: EnvelopeMeta,
    pub body: Value,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
}

impl ResponseEnvelope {
    /// Upstream answered; its status passes through untouched.
    pub fn from_upstream(response: UpstreamResponse) -> Self {
        Self {
            meta: EnvelopeMeta {
                status: response.status,
                status_text: response.status_text,
                headers: response.headers,
                duration_ms: response.duration_ms,
                url: response.url,
            },
            body: response.body,
            raw: response.raw,
            error_code: None,
        }
    }

    /// Local rejection or transport failure.
    pub fn from_error(error: &ProxyError) -> Self {
        let code = error.error_code();
        let (url, duration_ms) = match error {
            ProxyError::Upstream(ForwardFailure {
                url, duration_ms, ..
            }) => (url.clone(), *duration_ms),
            _ => (String::new(), 0),
        };

        let message = error.public_message();
        Self {
            meta: EnvelopeMeta {
                status: code.status().as_u16(),
                status_text: status_text(code.status()),
                headers: BTreeMap::new(),
                duration_ms,
                url,
            },
            body: json!({ "message": message }),
            raw: message,
            error_code: Some(code),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.meta.status).unwrap_or(StatusCode::BAD_GATEWAY)
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(crate) fn status_text(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialError;
    use crate::request::ValidationError;

    #[test]
    fn test_rejection_has_zero_duration_and_empty_url() {
        let error: ProxyError = ValidationError::InvalidPath("parent directory segments are not allowed").into();
        let envelope = ResponseEnvelope::from_error(&error);

        assert_eq!(envelope.meta.status, 400);
        assert_eq!(envelope.meta.status_text, "Bad Request");
        assert_eq!(envelope.meta.duration_ms, 0);
        assert!(envelope.meta.url.is_empty());
        assert!(envelope.meta.headers.is_empty());
        assert_eq!(envelope.error_code, Some(ErrorCode::InvalidPath));
        assert!(envelope.raw.contains("parent directory"));
    }

    #[test]
    fn test_transport_failure_keeps_url_and_duration() {
        let error: ProxyError = ForwardFailure {
            url: "https://atlas.microsoft.com/search".to_string(),
            duration_ms: 20_003,
            message: "upstream request timed out".to_string(),
        }
        .into();
        let envelope = ResponseEnvelope::from_error(&error);

        assert_eq!(envelope.meta.status, 502);
        assert_eq!(envelope.meta.duration_ms, 20_003);
        assert_eq!(envelope.meta.url, "https://atlas.microsoft.com/search");
        assert_eq!(envelope.error_code, Some(ErrorCode::RequestFailed));
    }

    #[test]
    fn test_upstream_envelope_has_no_error_code() {
        let envelope = ResponseEnvelope::from_upstream(UpstreamResponse {
            status: 404,
            status_text: "Not Found".to_string(),
            headers: BTreeMap::new(),
            duration_ms: 12,
            url: "https://atlas.microsoft.com/nope".to_string(),
            body: json!({ "error": { "code": "NotFound" } }),
            raw: r#"{"error":{"code":"NotFound"}}"#.to_string(),
        });

        assert_eq!(envelope.status(), StatusCode::NOT_FOUND);
        assert!(envelope.error_code.is_none());

        let serialized = serde_json::to_value(&envelope).unwrap();
        assert!(serialized.get("errorCode").is_none());
        assert_eq!(serialized["meta"]["statusText"], json!("Not Found"));
        assert_eq!(serialized["meta"]["durationMs"], json!(12));
    }

    #[test]
    fn test_serialized_error_code() {
        let envelope =
            ResponseEnvelope::from_error(&CredentialError::MissingMapsClientId.into());
        let serialized = serde_json::to_value(&envelope).unwrap();
        assert_eq!(serialized["errorCode"], json!("missing_maps_client_id"));
        assert_eq!(serialized["meta"]["status"], json!(500));
    }
}
