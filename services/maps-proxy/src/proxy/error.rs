use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::CredentialError;
use crate::request::ValidationError;

/// Used when a failure carries nothing safe to show the caller
pub const FALLBACK_ERROR_MESSAGE: &str = "Request failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidJson,
    InvalidPath,
    InvalidMethod,
    InvalidBaseUrl,
    PayloadTooLarge,
    MissingMapsClientId,
    MissingCredentials,
    TokenError,
    RequestFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "invalid_json",
            ErrorCode::InvalidPath => "invalid_path",
            ErrorCode::InvalidMethod => "invalid_method",
            ErrorCode::InvalidBaseUrl => "invalid_base_url",
            ErrorCode::PayloadTooLarge => "payload_too_large",
            ErrorCode::MissingMapsClientId => "missing_maps_client_id",
            ErrorCode::MissingCredentials => "missing_credentials",
            ErrorCode::TokenError => "token_error",
            ErrorCode::RequestFailed => "request_failed",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidJson
            | ErrorCode::InvalidPath
            | ErrorCode::InvalidMethod
            | ErrorCode::InvalidBaseUrl => StatusCode::BAD_REQUEST,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::MissingMapsClientId
            | ErrorCode::MissingCredentials
            | ErrorCode::TokenError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::RequestFailed => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Transport-level failure of the upstream call: no response was received.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ForwardFailure {
    pub url: String,
    pub duration_ms: u64,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Request body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Request body rejected: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] ForwardFailure),
}

impl ProxyError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProxyError::InvalidJson(_) => ErrorCode::InvalidJson,
            ProxyError::PayloadTooLarge(_) => ErrorCode::PayloadTooLarge,
            ProxyError::Validation(ValidationError::InvalidPath(_)) => ErrorCode::InvalidPath,
            ProxyError::Validation(ValidationError::InvalidMethod(_)) => ErrorCode::InvalidMethod,
            ProxyError::Validation(ValidationError::InvalidBaseUrl(_)) => ErrorCode::InvalidBaseUrl,
            ProxyError::Credential(CredentialError::MissingMapsClientId) => {
                ErrorCode::MissingMapsClientId
            }
            ProxyError::Credential(CredentialError::Token(e)) if e.is_missing_prerequisite() => {
                ErrorCode::MissingCredentials
            }
            ProxyError::Credential(CredentialError::Token(_)) => ErrorCode::TokenError,
            ProxyError::Upstream(_) => ErrorCode::RequestFailed,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.error_code().status()
    }

    /// Message safe to return to the browser. Secrets never reach these strings.
    pub fn public_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }
}
