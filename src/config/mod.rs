//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize, resolve relative paths)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//!
//! Route files:
//!     watcher.rs detects change
//!     → RefreshHandle::refresh()
//!     → definition sources re-read the files
//! ```
//!
//! # Design Decisions
//! - The gateway config is immutable once loaded; only route definitions refresh
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, GatewayConfig, ListenerConfig, ObservabilityConfig, PluginsConfig,
    RefreshConfig, TimeoutConfig,
};
pub use watcher::RouteFileWatcher;
