use anyhow::{Context, Result};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{DEFAULT_AUTHORITY_HOST, DEFAULT_TOKEN_SCOPE};
use crate::proxy::DEFAULT_UPSTREAM_TIMEOUT_SECS;
use crate::request::Normalizer;

pub const DEFAULT_MAPS_BASE_URL: &str = "https://atlas.microsoft.com";

#[derive(Clone)]
pub struct ProxyConfig {
    /// Listen host address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Maps API base URL used when a request names none
    pub default_base_url: String,

    /// Shared subscription key (key auth)
    pub api_key: Option<String>,

    /// Maps account client id sent alongside bearer tokens
    pub maps_client_id: Option<String>,

    /// Entra directory (tenant) id
    pub tenant_id: Option<String>,

    /// Entra application (client) id
    pub client_id: Option<String>,

    /// Entra application secret
    pub client_secret: Option<String>,

    /// Scope requested in the client-credentials exchange
    pub token_scope: String,

    /// Identity authority host
    pub authority_host: String,

    /// Upstream request timeout in seconds
    pub request_timeout_secs: u64,

    /// Token exchange timeout in seconds
    pub token_timeout_secs: u64,

    /// Maximum inbound body size in bytes
    pub max_body_size_bytes: usize,

    /// Accept plain http base URLs
    pub allow_insecure_upstream: bool,

    /// Log level
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            default_base_url: DEFAULT_MAPS_BASE_URL.to_string(),
            api_key: None,
            maps_client_id: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            token_scope: DEFAULT_TOKEN_SCOPE.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            request_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
            token_timeout_secs: 10,
            max_body_size_bytes: 1024 * 1024,
            allow_insecure_upstream: false,
            log_level: "info".to_string(),
        }
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("default_base_url", &self.default_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("maps_client_id", &self.maps_client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_scope", &self.token_scope)
            .field("authority_host", &self.authority_host)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("token_timeout_secs", &self.token_timeout_secs)
            .field("max_body_size_bytes", &self.max_body_size_bytes)
            .field("allow_insecure_upstream", &self.allow_insecure_upstream)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl ProxyConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            host: var("PROXY_HOST").unwrap_or(defaults.host),
            port: parse_or(var("PROXY_PORT"), "PROXY_PORT", defaults.port)?,
            default_base_url: var("AZURE_MAPS_BASE_URL").unwrap_or(defaults.default_base_url),
            api_key: var("AZURE_MAPS_SUBSCRIPTION_KEY"),
            maps_client_id: var("AZURE_MAPS_CLIENT_ID"),
            tenant_id: var("AZURE_TENANT_ID"),
            client_id: var("AZURE_CLIENT_ID"),
            client_secret: var("AZURE_CLIENT_SECRET"),
            token_scope: var("AZURE_MAPS_TOKEN_SCOPE").unwrap_or(defaults.token_scope),
            authority_host: var("AZURE_AUTHORITY_HOST").unwrap_or(defaults.authority_host),
            request_timeout_secs: parse_or(
                var("REQUEST_TIMEOUT_SECS"),
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            )?,
            token_timeout_secs: parse_or(
                var("TOKEN_TIMEOUT_SECS"),
                "TOKEN_TIMEOUT_SECS",
                defaults.token_timeout_secs,
            )?,
            max_body_size_bytes: parse_or(
                var("MAX_BODY_SIZE_BYTES"),
                "MAX_BODY_SIZE_BYTES",
                defaults.max_body_size_bytes,
            )?,
            allow_insecure_upstream: parse_or(
                var("ALLOW_INSECURE_UPSTREAM"),
                "ALLOW_INSECURE_UPSTREAM",
                defaults.allow_insecure_upstream,
            )?,
            log_level: var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate default base URL
        Normalizer::new(self.default_base_url.clone())
            .allow_insecure(self.allow_insecure_upstream)
            .resolve_base_url(None)
            .context("AZURE_MAPS_BASE_URL is not a usable base URL")?;

        // Validate timeouts
        if self.request_timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than 0");
        }
        if self.token_timeout_secs == 0 {
            anyhow::bail!("TOKEN_TIMEOUT_SECS must be greater than 0");
        }

        // Validate max body size
        if self.max_body_size_bytes == 0 {
            anyhow::bail!("MAX_BODY_SIZE_BYTES must be greater than 0");
        }

        if self.token_scope.trim().is_empty() {
            anyhow::bail!("AZURE_MAPS_TOKEN_SCOPE cannot be empty");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Which auth modes the configuration can serve without per-request overrides
    pub fn auth_summary(&self) -> &'static str {
        let bearer = self.maps_client_id.is_some()
            && self.tenant_id.is_some()
            && self.client_id.is_some()
            && self.client_secret.is_some();
        match (self.api_key.is_some(), bearer) {
            (true, true) => "key+bearer",
            (true, false) => "key",
            (false, true) => "bearer",
            (false, false) => "none",
        }
    }
}

fn parse_or<T>(value: Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v.parse().with_context(|| format!("Invalid {}", name)),
        None => Ok(default),
    }
}
