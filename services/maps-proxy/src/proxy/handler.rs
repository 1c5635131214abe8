use super::{
    ForwardContext, ProxyError, ProxyState, ResponseEnvelope, StaticMapError, StaticMapImage,
    StaticMapQuery, UpstreamResponse,
};
use crate::auth::TokenError;
use crate::config::ProxyConfig;
use crate::request::RequestDescriptor;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct ProxyHandler {
    state: ProxyState,
}

impl ProxyHandler {
    pub fn new(config: Arc<ProxyConfig>) -> anyhow::Result<Self> {
        let state = ProxyState::new((*config).clone())?;
        Ok(Self { state })
    }

    pub fn from_state(state: ProxyState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    fn forward_context(&self) -> ForwardContext {
        ForwardContext::with_timeout(self.state.config.request_timeout())
    }

    /// Entry point for raw proxy bodies. Only unparseable JSON is `invalid_json`; badly
    /// typed fields fail with the validation error of the field they belong to.
    pub async fn handle_json(&self, body: &[u8]) -> ResponseEnvelope {
        let value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "Rejecting unparseable proxy body");
                return self.reject(ProxyError::InvalidJson(e.to_string()));
            }
        };

        match RequestDescriptor::from_value(&value) {
            Ok(descriptor) => self.handle(&descriptor).await,
            Err(e) => self.reject(e.into()),
        }
    }

    /// Envelope for a request that never reached the pipeline.
    pub fn reject(&self, error: ProxyError) -> ResponseEnvelope {
        warn!(
            error_code = error.error_code().as_str(),
            status = error.status().as_u16(),
            error = %error,
            "Proxy request rejected"
        );
        ResponseEnvelope::from_error(&error)
    }

    pub async fn handle(&self, descriptor: &RequestDescriptor) -> ResponseEnvelope {
        self.handle_with_context(descriptor, &self.forward_context())
            .await
    }

    pub async fn handle_with_context(
        &self,
        descriptor: &RequestDescriptor,
        context: &ForwardContext,
    ) -> ResponseEnvelope {
        match self.execute(descriptor, context).await {
            Ok(response) => ResponseEnvelope::from_upstream(response),
            Err(e) => {
                warn!(
                    error_code = e.error_code().as_str(),
                    status = e.status().as_u16(),
                    error = %e,
                    "Proxy request failed"
                );
                ResponseEnvelope::from_error(&e)
            }
        }
    }

    #[instrument(skip_all, fields(request_path = %descriptor.path))]
    async fn execute(
        &self,
        descriptor: &RequestDescriptor,
        context: &ForwardContext,
    ) -> Result<UpstreamResponse, ProxyError> {
        let start = std::time::Instant::now();

        // Step 1: Validate and canonicalize
        debug!("Step 1: Normalizing request");
        let request = self.state.normalizer.normalize(descriptor)?;

        // Step 2: Resolve credentials
        debug!("Step 2: Resolving credentials");
        let credential = self
            .state
            .credentials
            .resolve(descriptor.auth.as_ref())
            .await?;

        // Step 3: Forward upstream
        debug!("Step 3: Forwarding request to upstream");
        let response = self
            .state
            .upstream_client
            .forward(&request, &credential, context)
            .await?;

        info!(
            method = %request.method,
            path = %request.path,
            auth = credential.kind(),
            status = response.status,
            upstream_latency_ms = response.duration_ms,
            total_latency_ms = start.elapsed().as_millis(),
            "Request completed"
        );

        Ok(response)
    }

    /// Raw bearer token for clients that talk to the maps service directly.
    pub async fn bearer_token(&self) -> Result<String, TokenError> {
        self.state.credentials.tokens().get_token().await
    }

    #[instrument(skip_all)]
    pub async fn static_map(&self, query: &StaticMapQuery) -> Result<StaticMapImage, StaticMapError> {
        let request = query.validate()?;
        let credential = self.state.credentials.resolve(None).await?;
        let base_url = self
            .state
            .normalizer
            .resolve_base_url(None)
            .map_err(|e| StaticMapError::Transport(e.to_string()))?;

        request
            .fetch(
                self.state.upstream_client.http_client(),
                &base_url,
                &credential,
                self.state.config.request_timeout(),
            )
            .await
    }
}
