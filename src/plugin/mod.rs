//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! Route build:
//!     PluginSpec (name, config blob, implementation?)
//!     → manifest.rs (name → implementation identity)
//!     → loader.rs (identity → shared instance, memoized)
//!         → builtin/ (host-linked implementations)
//!         → abi.rs (shared libraries, one scope per plugin path)
//!     → PluginInstance (shared plugin + this route's config)
//!
//! Request time:
//!     chain.rs: plugin[0] → plugin[1] → ... (each decides whether to continue)
//! ```
//!
//! # Design Decisions
//! - One plugin instance per identity, shared by every route using it
//! - Configuration stays a raw JSON blob per route and is decoded on demand
//! - Plugins can suspend; the chain is async end to end

pub mod abi;
pub mod builtin;
pub mod chain;
pub mod loader;
pub mod manifest;
pub mod switch;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;
use crate::http::exchange::Exchange;

pub use chain::PluginChain;
pub use loader::PluginLoader;
pub use switch::{CapableSwitch, CapableSwitchManager, SwitchDescriptor};

/// A unit of request/response middleware.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Handle the exchange. Call `chain.proceed(exchange)` to run the rest of
    /// the chain; return without calling it to finish here.
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError>;

    /// Switches this plugin reads, advertised when it is instantiated.
    fn exported_switches(&self) -> Vec<SwitchDescriptor> {
        Vec::new()
    }
}

/// A plugin bound into a route, with that route's configuration.
#[derive(Clone)]
pub struct PluginInstance {
    name: String,
    identity: String,
    plugin: Arc<dyn Plugin>,
    config: Arc<str>,
}

impl PluginInstance {
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        plugin: Arc<dyn Plugin>,
        config: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
            plugin,
            config: config.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }

    pub fn config(&self) -> &str {
        &self.config
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("config", &self.config)
            .finish()
    }
}
