use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid path: {0}")]
    InvalidPath(&'static str),

    #[error("Unsupported method: {0}")]
    InvalidMethod(String),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}
