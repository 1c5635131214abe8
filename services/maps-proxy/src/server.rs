use crate::api::create_router;
use crate::config::ProxyConfig;
use crate::proxy::ProxyHandler;
use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    handler: Arc<ProxyHandler>,
}

impl ProxyServer {
    /// Create a new proxy server
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let config = Arc::new(config);
        let handler = Arc::new(ProxyHandler::new(config.clone())?);
        Ok(Self { config, handler })
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.handler))
    }

    /// Run the proxy server until the process is stopped
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the proxy server, draining in-flight requests once `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = self
            .config
            .listen_addr()
            .parse()
            .context("Invalid listen address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        info!(
            %local_addr,
            base_url = %self.config.default_base_url,
            auth = self.config.auth_summary(),
            "Maps proxy listening"
        );

        axum::serve(listener, self.router().into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server encountered an unrecoverable error")?;

        info!("Maps proxy server stopped");
        Ok(())
    }
}
