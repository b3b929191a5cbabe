//! StaticResponse.

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use serde::Deserialize;

use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::plugin::{Plugin, PluginChain, SwitchDescriptor};

pub const IDENTITY: &str = "gateway.builtin.static-response";

/// Switch that turns the canned response off without touching routes.
pub const ENABLED_SWITCH: &str = "enabled";

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "text/plain; charset=utf-8".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticResponseConfig {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

/// Writes a fixed body and stops the chain.
#[derive(Debug, Default)]
pub struct StaticResponse;

#[async_trait]
impl Plugin for StaticResponse {
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
        let enabled = chain
            .switches()
            .group(IDENTITY)
            .switch::<bool>(ENABLED_SWITCH)?
            .value_or(true);
        if !enabled {
            return chain.proceed(exchange).await;
        }

        let config: StaticResponseConfig = chain.config()?;
        let status = StatusCode::from_u16(config.status)
            .map_err(|e| PluginError::execution("StaticResponse", e))?;
        let body = exchange
            .expand(&config.body)
            .map_err(|e| PluginError::execution("StaticResponse", e))?;
        let content_type = HeaderValue::try_from(config.content_type)
            .map_err(|e| PluginError::execution("StaticResponse", e))?;

        exchange
            .response_mut()
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        exchange.complete_with(status, body);
        Ok(())
    }

    fn exported_switches(&self) -> Vec<SwitchDescriptor> {
        vec![SwitchDescriptor::new(
            ENABLED_SWITCH,
            "Serve the configured body; when off the chain continues",
        )]
    }
}
