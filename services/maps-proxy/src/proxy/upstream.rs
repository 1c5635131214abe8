use super::envelope::status_text;
use super::ForwardFailure;
use crate::auth::ResolvedCredential;
use crate::request::NormalizedRequest;
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 20;

/// Response headers exposed to the caller. Everything else stays server-side.
pub const EXPOSED_RESPONSE_HEADERS: &[&str] = &[
    "content-type",
    "x-ms-request-id",
    "x-ms-client-request-id",
    "x-ms-correlation-request-id",
    "x-correlation-id",
    "request-id",
];

/// Deadline and cancellation for one upstream call.
#[derive(Debug, Clone)]
pub struct ForwardContext {
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl ForwardContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for ForwardContext {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub duration_ms: u64,
    pub url: String,
    pub body: Value,
    pub raw: String,
}

pub struct UpstreamClient {
    http_client: Client,
}

impl UpstreamClient {
    pub fn new() -> anyhow::Result<Self> {
        // Deadlines come from ForwardContext, not the client
        let http_client = Client::builder().pool_max_idle_per_host(20).build()?;

        Ok(Self { http_client })
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.http_client
    }

    #[instrument(skip_all, fields(method = %request.method, path = %request.path, auth = credential.kind()))]
    pub async fn forward(
        &self,
        request: &NormalizedRequest,
        credential: &ResolvedCredential,
        context: &ForwardContext,
    ) -> Result<UpstreamResponse, ForwardFailure> {
        let url = request.url();
        let start = Instant::now();

        debug!(upstream_url = %url, "Forwarding request to upstream");

        let mut builder = credential.apply(self.http_client.request(request.method.into(), &url));

        if let Some(body) = &request.body {
            let payload = serde_json::to_vec(body).map_err(|e| ForwardFailure {
                url: url.clone(),
                duration_ms: elapsed_ms(start),
                message: format!("Failed to serialize request body: {}", e),
            })?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(payload);
        }

        let call = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = curate_headers(response.headers());
            let raw = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, raw))
        };

        let outcome = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => Err("Upstream request cancelled".to_string()),
            result = tokio::time::timeout(context.timeout, call) => match result {
                Ok(Ok(parts)) => Ok(parts),
                Ok(Err(e)) => Err(format!("Upstream request failed: {}", e)),
                Err(_) => Err(format!(
                    "Upstream request timed out after {}ms",
                    context.timeout.as_millis()
                )),
            },
        };

        let duration_ms = elapsed_ms(start);

        let (status, headers, raw) = match outcome {
            Ok(parts) => parts,
            Err(message) => {
                warn!(upstream_url = %url, duration_ms, error = %message, "Upstream call failed");
                return Err(ForwardFailure {
                    url,
                    duration_ms,
                    message,
                });
            }
        };

        let body = parse_body(headers.get("content-type").map(String::as_str), &raw);

        info!(
            status = status.as_u16(),
            latency_ms = duration_ms,
            response_size_bytes = raw.len(),
            "Upstream response received"
        );

        Ok(UpstreamResponse {
            status: status.as_u16(),
            status_text: status_text(status),
            headers,
            duration_ms,
            url,
            body,
            raw,
        })
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn curate_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    EXPOSED_RESPONSE_HEADERS
        .iter()
        .filter_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

pub(crate) fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
}

/// JSON bodies are parsed when declared as such; anything else, or anything that fails to
/// parse, is passed through as a string.
fn parse_body(content_type: Option<&str>, raw: &str) -> Value {
    if is_json_content_type(content_type) {
        match serde_json::from_str(raw) {
            Ok(value) => return value,
            Err(e) => debug!(error = %e, "Upstream declared JSON but body did not parse"),
        }
    }
    Value::String(raw.to_string())
}
