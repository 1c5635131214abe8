use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing tenant ID (AZURE_TENANT_ID is not configured)")]
    MissingTenantId,

    #[error("Missing client ID (AZURE_CLIENT_ID is not configured)")]
    MissingClientId,

    #[error("Missing client secret (AZURE_CLIENT_SECRET is not configured)")]
    MissingClientSecret,

    #[error("Token endpoint returned error (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint unreachable: {0}")]
    Transport(String),

    #[error("Token request timeout")]
    Timeout,

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TokenError::Timeout
        } else {
            TokenError::Transport(err.to_string())
        }
    }
}

impl TokenError {
    /// `missing_<name>` identifier for prerequisite failures
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::MissingTenantId => "missing_tenant_id",
            TokenError::MissingClientId => "missing_client_id",
            TokenError::MissingClientSecret => "missing_client_secret",
            TokenError::Rejected { .. } => "token_rejected",
            TokenError::Transport(_) => "token_transport",
            TokenError::Timeout => "token_timeout",
            TokenError::InvalidResponse(_) => "token_invalid_response",
        }
    }

    /// True when the exchange never left the process because configuration was incomplete
    pub fn is_missing_prerequisite(&self) -> bool {
        matches!(
            self,
            TokenError::MissingTenantId
                | TokenError::MissingClientId
                | TokenError::MissingClientSecret
        )
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No API key or maps client ID is configured")]
    MissingMapsClientId,

    #[error("Unable to obtain bearer token: {0}")]
    Token(#[from] TokenError),
}
