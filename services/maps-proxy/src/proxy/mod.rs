mod envelope;
mod error;
pub(crate) mod handler;
mod static_map;
mod upstream;

pub use envelope::{EnvelopeMeta, ResponseEnvelope};
pub use error::{ErrorCode, ForwardFailure, ProxyError, FALLBACK_ERROR_MESSAGE};
pub use handler::ProxyHandler;
pub use static_map::{
    StaticMapError, StaticMapImage, StaticMapQuery, StaticMapRequest, HEIGHT_RANGE, WIDTH_RANGE,
    ZOOM_RANGE,
};
pub use upstream::{
    ForwardContext, UpstreamClient, UpstreamResponse, DEFAULT_UPSTREAM_TIMEOUT_SECS,
    EXPOSED_RESPONSE_HEADERS,
};

use crate::auth::{CredentialDefaults, CredentialResolver, EntraTokenClient, TokenProvider};
use crate::config::ProxyConfig;
use crate::request::Normalizer;
use std::sync::Arc;

#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub normalizer: Arc<Normalizer>,
    pub credentials: Arc<CredentialResolver>,
    pub upstream_client: Arc<UpstreamClient>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let exchanger =
            EntraTokenClient::from_config(&config).context("Failed to build token client")?;
        let tokens = Arc::new(TokenProvider::new(Arc::new(exchanger)));
        Self::with_token_provider(config, tokens)
    }

    /// Builds the state around an existing token provider (pre-seeded cache, fake clock).
    pub fn with_token_provider(
        config: ProxyConfig,
        tokens: Arc<TokenProvider>,
    ) -> anyhow::Result<Self> {
        let normalizer = Arc::new(
            Normalizer::new(config.default_base_url.clone())
                .allow_insecure(config.allow_insecure_upstream),
        );
        let credentials = Arc::new(CredentialResolver::new(
            CredentialDefaults {
                api_key: config.api_key.clone(),
                maps_client_id: config.maps_client_id.clone(),
            },
            tokens,
        ));
        let upstream_client = Arc::new(UpstreamClient::new()?);

        Ok(Self {
            config: Arc::new(config),
            normalizer,
            credentials,
            upstream_client,
        })
    }
}
