//! Host-linked plugins.
//!
//! These are always available under `gateway.builtin.*` identities and are
//! listed in a manifest compiled into the binary, so plugin paths only need
//! to carry third-party plugins.

pub mod header;
pub mod redirect;
pub mod respond;

use axum::http::{HeaderName, HeaderValue};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::PluginError;
use crate::plugin::Plugin;

/// Manifest of the built-in plugins.
pub const BUILTIN_MANIFEST: &str = "\
# Built-in plugins
AddRequestHeader=gateway.builtin.add-request-header
AddResponseHeader=gateway.builtin.add-response-header
RedirectTo=gateway.builtin.redirect-to
StaticResponse=gateway.builtin.static-response
";

pub const IDENTITY_PREFIX: &str = "gateway.builtin.";

/// Identities of every built-in plugin.
pub const IDENTITIES: &[&str] = &[
    "gateway.builtin.add-request-header",
    "gateway.builtin.add-response-header",
    "gateway.builtin.redirect-to",
    "gateway.builtin.static-response",
];

/// Construct the built-in plugin registered under `identity`.
pub fn create(identity: &str) -> Option<Arc<dyn Plugin>> {
    let plugin: Arc<dyn Plugin> = match identity {
        "gateway.builtin.add-request-header" => Arc::new(header::AddRequestHeader),
        "gateway.builtin.add-response-header" => Arc::new(header::AddResponseHeader),
        "gateway.builtin.redirect-to" => Arc::new(redirect::RedirectTo),
        "gateway.builtin.static-response" => Arc::new(respond::StaticResponse),
        _ => return None,
    };
    Some(plugin)
}

/// `name` / `value` pair of the header plugins.
#[derive(Debug, Clone, Deserialize)]
pub struct NameValueConfig {
    pub name: String,
    pub value: String,
}

fn header_pair(plugin: &str, name: &str, value: &str) -> Result<(HeaderName, HeaderValue), PluginError> {
    let name = HeaderName::try_from(name).map_err(|e| PluginError::execution(plugin, e))?;
    let value = HeaderValue::try_from(value).map_err(|e| PluginError::execution(plugin, e))?;
    Ok((name, value))
}
