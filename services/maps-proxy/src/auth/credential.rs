use reqwest::RequestBuilder;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{CredentialError, TokenProvider, MAPS_CLIENT_ID_HEADER, SUBSCRIPTION_KEY_HEADER};
use crate::request::AuthOverride;

/// Credential attached to a single upstream call. Never logged or echoed.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredential {
    Key { value: String },
    Bearer { token: String, client_id: String },
}

impl ResolvedCredential {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedCredential::Key { .. } => "key",
            ResolvedCredential::Bearer { .. } => "bearer",
        }
    }

    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            ResolvedCredential::Key { value } => builder.header(SUBSCRIPTION_KEY_HEADER, value),
            ResolvedCredential::Bearer { token, client_id } => builder
                .bearer_auth(token)
                .header(MAPS_CLIENT_ID_HEADER, client_id),
        }
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedCredential::Key { .. } => f
                .debug_struct("Key")
                .field("value", &"<redacted>")
                .finish(),
            ResolvedCredential::Bearer { client_id, .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .field("client_id", client_id)
                .finish(),
        }
    }
}

/// Process-wide credentials used when a request carries no override.
#[derive(Clone, Default)]
pub struct CredentialDefaults {
    pub api_key: Option<String>,
    pub maps_client_id: Option<String>,
}

impl fmt::Debug for CredentialDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialDefaults")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("maps_client_id", &self.maps_client_id)
            .finish()
    }
}

pub struct CredentialResolver {
    defaults: CredentialDefaults,
    tokens: Arc<TokenProvider>,
}

impl CredentialResolver {
    pub fn new(defaults: CredentialDefaults, tokens: Arc<TokenProvider>) -> Self {
        Self { defaults, tokens }
    }

    pub fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// API key first (override, then default); otherwise a bearer token paired with the
    /// maps client ID.
    #[instrument(skip_all)]
    pub async fn resolve(
        &self,
        auth: Option<&AuthOverride>,
    ) -> Result<ResolvedCredential, CredentialError> {
        let api_key = non_blank(auth.and_then(|a| a.api_key.as_deref()))
            .or_else(|| non_blank(self.defaults.api_key.as_deref()));

        if let Some(value) = api_key {
            debug!("using subscription key credential");
            return Ok(ResolvedCredential::Key {
                value: value.to_string(),
            });
        }

        let client_id = non_blank(auth.and_then(|a| a.client_id.as_deref()))
            .or_else(|| non_blank(self.defaults.maps_client_id.as_deref()))
            .ok_or(CredentialError::MissingMapsClientId)?
            .to_string();

        let token = self.tokens.get_token().await?;
        debug!(client_id = %client_id, "using bearer token credential");

        Ok(ResolvedCredential::Bearer { token, client_id })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ExchangedToken, TokenError, TokenExchanger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExchanger {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenExchanger for CountingExchanger {
        async fn exchange(&self) -> Result<ExchangedToken, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExchangedToken {
                access_token: "bearer-token".to_string(),
                expires_in_secs: 3600,
            })
        }
    }

    struct RejectingExchanger;

    #[async_trait]
    impl TokenExchanger for RejectingExchanger {
        async fn exchange(&self) -> Result<ExchangedToken, TokenError> {
            Err(TokenError::Rejected {
                status: 400,
                body: "AADSTS7000215".to_string(),
            })
        }
    }

    fn resolver(
        defaults: CredentialDefaults,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> CredentialResolver {
        CredentialResolver::new(defaults, Arc::new(TokenProvider::new(exchanger)))
    }

    #[tokio::test]
    async fn test_api_key_wins_without_exchange() {
        let exchanger = Arc::new(CountingExchanger::default());
        let resolver = resolver(
            CredentialDefaults {
                api_key: Some("default-key".to_string()),
                maps_client_id: Some("maps-client".to_string()),
            },
            exchanger.clone(),
        );

        let credential = resolver.resolve(None).await.unwrap();
        assert_eq!(
            credential,
            ResolvedCredential::Key {
                value: "default-key".to_string()
            }
        );

        let override_auth = AuthOverride {
            api_key: Some("override-key".to_string()),
            client_id: Some("other-client".to_string()),
        };
        let credential = resolver.resolve(Some(&override_auth)).await.unwrap();
        assert_eq!(
            credential,
            ResolvedCredential::Key {
                value: "override-key".to_string()
            }
        );

        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blank_key_falls_through_to_bearer() {
        let exchanger = Arc::new(CountingExchanger::default());
        let resolver = resolver(
            CredentialDefaults {
                api_key: Some("  ".to_string()),
                maps_client_id: Some("maps-client".to_string()),
            },
            exchanger.clone(),
        );

        let credential = resolver.resolve(None).await.unwrap();
        assert_eq!(
            credential,
            ResolvedCredential::Bearer {
                token: "bearer-token".to_string(),
                client_id: "maps-client".to_string()
            }
        );
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_id_override_is_used() {
        let resolver = resolver(
            CredentialDefaults {
                api_key: None,
                maps_client_id: Some("default-client".to_string()),
            },
            Arc::new(CountingExchanger::default()),
        );

        let credential = resolver
            .resolve(Some(&AuthOverride::with_client_id("override-client")))
            .await
            .unwrap();
        assert!(matches!(
            credential,
            ResolvedCredential::Bearer { ref client_id, .. } if client_id == "override-client"
        ));
    }

    #[tokio::test]
    async fn test_missing_client_id_skips_exchange() {
        let exchanger = Arc::new(CountingExchanger::default());
        let resolver = resolver(CredentialDefaults::default(), exchanger.clone());

        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(err, CredentialError::MissingMapsClientId));
        assert_eq!(exchanger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exchange_failure_surfaces_token_error() {
        let resolver = resolver(
            CredentialDefaults {
                api_key: None,
                maps_client_id: Some("maps-client".to_string()),
            },
            Arc::new(RejectingExchanger),
        );

        let err = resolver.resolve(None).await.unwrap_err();
        assert!(matches!(
            err,
            CredentialError::Token(TokenError::Rejected { status: 400, .. })
        ));
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let key = ResolvedCredential::Key {
            value: "key-123".to_string(),
        };
        let bearer = ResolvedCredential::Bearer {
            token: "tok-456".to_string(),
            client_id: "client".to_string(),
        };
        let defaults = CredentialDefaults {
            api_key: Some("key-789".to_string()),
            maps_client_id: None,
        };

        assert!(!format!("{:?}", key).contains("key-123"));
        assert!(!format!("{:?}", bearer).contains("tok-456"));
        assert!(format!("{:?}", bearer).contains("client"));
        assert!(!format!("{:?}", defaults).contains("key-789"));
    }
}
