pub mod api;
pub mod auth;
pub mod config;
pub mod proxy;
pub mod request;
pub mod server;

pub use api::create_router;
pub use config::ProxyConfig;
pub use proxy::{ErrorCode, ProxyHandler, ProxyState, ResponseEnvelope};
pub use request::RequestDescriptor;
pub use server::ProxyServer;
