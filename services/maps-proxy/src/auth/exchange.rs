use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{TokenError, DEFAULT_AUTHORITY_HOST, DEFAULT_TOKEN_SCOPE};
use crate::config::ProxyConfig;

/// Lifetime assumed when the identity provider omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Clone)]
pub struct ExchangedToken {
    pub access_token: String,
    pub expires_in_secs: u64,
}

impl fmt::Debug for ExchangedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("access_token", &"<redacted>")
            .field("expires_in_secs", &self.expires_in_secs)
            .finish()
    }
}

/// Performs one client-credentials exchange per call. No caching, no retries.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self) -> Result<ExchangedToken, TokenError>;
}

/// Client-credentials exchange against the Microsoft identity platform v2.0 endpoint.
pub struct EntraTokenClient {
    http_client: Client,
    authority_host: String,
    tenant_id: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scope: String,
}

impl EntraTokenClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(2)
            .build()?;

        Ok(Self {
            http_client,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
            scope: DEFAULT_TOKEN_SCOPE.to_string(),
        })
    }

    pub fn from_config(config: &ProxyConfig) -> anyhow::Result<Self> {
        let mut client = Self::new(config.token_timeout())?
            .with_authority_host(&config.authority_host)
            .with_scope(&config.token_scope);
        client.tenant_id = config.tenant_id.clone();
        client.client_id = config.client_id.clone();
        client.client_secret = config.client_secret.clone();
        Ok(client)
    }

    pub fn with_authority_host(mut self, host: &str) -> Self {
        self.authority_host = host.trim_end_matches('/').to_string();
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn token_url(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id)
    }
}

fn required<'a>(value: &'a Option<String>, missing: TokenError) -> Result<&'a str, TokenError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(missing)
}

#[async_trait]
impl TokenExchanger for EntraTokenClient {
    #[instrument(skip(self))]
    async fn exchange(&self) -> Result<ExchangedToken, TokenError> {
        let tenant_id = required(&self.tenant_id, TokenError::MissingTenantId)?;
        let client_id = required(&self.client_id, TokenError::MissingClientId)?;
        let client_secret = required(&self.client_secret, TokenError::MissingClientSecret)?;

        let url = self.token_url(tenant_id);
        debug!(url = %url, scope = %self.scope, "requesting client-credentials token");

        let start = std::time::Instant::now();

        let response = self
            .http_client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TokenError::InvalidResponse(format!("Failed to parse token response: {}", e)))?;

        let token = parse_token_body(&body)?;

        info!(
            latency_ms = start.elapsed().as_millis(),
            expires_in_secs = token.expires_in_secs,
            "client-credentials token issued"
        );

        Ok(token)
    }
}

/// `expires_in` arrives as a number from the v2.0 endpoint and as a string from older ones.
fn parse_token_body(body: &Value) -> Result<ExchangedToken, TokenError> {
    let access_token = body["access_token"]
        .as_str()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| TokenError::InvalidResponse("missing access_token".to_string()))?
        .to_string();

    let expires_in_secs = body["expires_in"]
        .as_u64()
        .or_else(|| body["expires_in"].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

    Ok(ExchangedToken {
        access_token,
        expires_in_secs,
    })
}
