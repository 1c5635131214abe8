use std::net::TcpListener;
use std::time::Duration;

use anyhow::{Context, Result};
use maps_explorer_proxy::config::ProxyConfig;
use maps_explorer_proxy::request::RequestDescriptor;
use maps_explorer_proxy::server::ProxyServer;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Re-export external crates needed by the benches
pub use maps_explorer_proxy;
pub use serde_json;

pub const BENCH_API_KEY: &str = "bench-key";
pub const BENCH_PATH: &str = "search/address/reverse/json";

/// Descriptors covering the shapes the explorer UI sends most often.
pub fn sample_descriptors() -> Vec<(&'static str, RequestDescriptor)> {
    vec![
        ("bare_path", RequestDescriptor::new("search/address/json")),
        (
            "reverse_geocode",
            RequestDescriptor::new(BENCH_PATH)
                .with_param("api-version", "1.0")
                .with_param("query", "47.6062,-122.3321")
                .with_param("language", "en-US"),
        ),
        (
            "route_post",
            RequestDescriptor::new("route/directions/json")
                .with_method("POST")
                .with_param("api-version", "1.0")
                .with_param("query", "52.50931,13.42936:52.50274,13.43872")
                .with_param("maxAlternatives", 3)
                .with_param("traffic", true)
                .with_body(json!({ "supportingPoints": { "type": "GeometryCollection", "geometries": [] } })),
        ),
        (
            "base_url_override",
            RequestDescriptor::new("weather/currentConditions/json")
                .with_base_url("https://eu.atlas.microsoft.com/")
                .with_param("query", "48.85,2.35"),
        ),
    ]
}

fn unused_port() -> Result<u16> {
    Ok(TcpListener::bind("127.0.0.1:0")
        .context("failed to bind ephemeral port")?
        .local_addr()?
        .port())
}

/// A running proxy wired to a wiremock upstream, using key auth.
pub struct ProxyBenchFixture {
    pub upstream: MockServer,
    pub proxy_url: String,
    handle: JoinHandle<Result<()>>,
}

impl ProxyBenchFixture {
    pub async fn start() -> Result<Self> {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", BENCH_PATH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "summary": { "numResults": 1 },
                "addresses": [{ "address": { "freeformAddress": "400 Broad St, Seattle, WA 98109" } }]
            })))
            .mount(&upstream)
            .await;

        let config = ProxyConfig {
            port: unused_port()?,
            default_base_url: upstream.uri(),
            api_key: Some(BENCH_API_KEY.to_string()),
            allow_insecure_upstream: true,
            log_level: "warn".to_string(),
            ..ProxyConfig::default()
        };
        config.validate()?;

        let addr = config.listen_addr();
        let server = ProxyServer::new(config)?;
        let handle = tokio::spawn(async move { server.run().await });
        wait_for_port(&addr).await?;
        debug!(%addr, "bench proxy ready");

        Ok(Self {
            upstream,
            proxy_url: format!("http://{}/api/proxy", addr),
            handle,
        })
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn wait_for_port(addr: &str) -> Result<()> {
    for _ in 0..20 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("proxy [{}] did not become ready in time", addr)
}
