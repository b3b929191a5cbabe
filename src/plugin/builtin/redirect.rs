//! RedirectTo.

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use serde::Deserialize;

use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::plugin::{Plugin, PluginChain};

#[derive(Debug, Clone, Deserialize)]
pub struct RedirectConfig {
    pub status: u16,
    pub url: String,
}

/// Answers with a 3xx redirect and stops the chain.
#[derive(Debug, Default)]
pub struct RedirectTo;

impl RedirectConfig {
    fn resolve(&self, exchange: &Exchange) -> Result<(StatusCode, HeaderValue), String> {
        let status = StatusCode::from_u16(self.status).map_err(|e| e.to_string())?;
        if !status.is_redirection() {
            return Err(format!("status must be a 3xx code, but was {}", self.status));
        }

        let url = exchange.expand(&self.url).map_err(|e| e.to_string())?;
        // Relative locations are allowed; absolute ones must parse.
        if url.contains("://") {
            url::Url::parse(&url).map_err(|e| format!("invalid url '{}': {}", url, e))?;
        }
        let location = HeaderValue::try_from(url).map_err(|e| e.to_string())?;
        Ok((status, location))
    }
}

#[async_trait]
impl Plugin for RedirectTo {
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
        if exchange.is_completed() {
            return Ok(());
        }
        let config: RedirectConfig = chain.config()?;
        let (status, location) = config
            .resolve(exchange)
            .map_err(|e| PluginError::execution("RedirectTo", e))?;

        exchange
            .response_mut()
            .headers_mut()
            .insert(header::LOCATION, location);
        exchange.complete_with(status, axum::body::Body::empty());
        Ok(())
    }
}
