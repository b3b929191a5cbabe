//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use api_gateway::config::GatewayConfig;
use api_gateway::lifecycle::{Gateway, Shutdown};
use api_gateway::locator::RefreshHandle;

/// A gateway serving on a fixed local port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub refresh: RefreshHandle,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for RunningGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Bootstrap `config` and serve it on `addr`.
pub async fn start_gateway(addr: SocketAddr, mut config: GatewayConfig) -> RunningGateway {
    config.listener.bind_address = addr.to_string();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let gateway = Gateway::bootstrap(config).await.unwrap();
    let shutdown = gateway.shutdown().clone();
    let refresh = gateway.refresh().clone();

    tokio::spawn(async move {
        let _ = gateway.serve(listener).await;
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    RunningGateway {
        addr,
        shutdown,
        refresh,
    }
}

/// Client without connection pooling or redirects, so every call is fresh.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Parse a `[[routes]]` TOML snippet.
pub fn routes(toml_text: &str) -> Vec<api_gateway::routing::RouteDefinition> {
    #[derive(serde::Deserialize)]
    struct File {
        routes: Vec<api_gateway::routing::RouteDefinition>,
    }
    toml::from_str::<File>(toml_text).unwrap().routes
}

pub fn write(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

/// Poll `check` until it returns true or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
