//! API gateway dispatch core.
//!
//! Requests are matched against a cached, ordered route table whose routes
//! carry a predicate tree and a plugin chain. Route definitions come from
//! configuration and route files and are refreshed without restarts.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod locator;
pub mod net;
pub mod observability;
pub mod plugin;
pub mod predicate;
pub mod routing;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use http::HttpServer;
pub use lifecycle::{Gateway, Shutdown};
