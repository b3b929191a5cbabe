//! Gateway error types.
//!
//! # Taxonomy
//! - `PredicateError`: unknown predicate names, bad arguments, evaluation failures
//! - `PluginError`: manifest/implementation resolution, loading, config decoding, execution
//! - `RouteBuildError`: one route definition could not become a `Route`
//! - `LocatorError`: a whole refresh failed (the cached table is kept)
//! - `RefreshError`: what a refresh trigger observes
//!
//! Route-scoped errors never abort a refresh unless strict mode is enabled.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::loader::ConfigError;

/// Errors raised while building or evaluating predicates.
#[derive(Debug, Error)]
pub enum PredicateError {
    /// The name is not one of the known predicate types.
    #[error("unknown predicate type [{0}]")]
    UnknownPredicate(String),

    /// The predicate type is known but no factory was registered for it.
    #[error("no predicate factory registered for [{0}]")]
    FactoryNotRegistered(String),

    /// Argument binding or validation failed.
    #[error("invalid arguments for predicate {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    /// A predicate failed while testing a request.
    #[error("predicate evaluation failed: {0}")]
    Evaluation(String),
}

impl PredicateError {
    pub fn invalid(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidArguments {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by the plugin subsystem.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No manifest entry maps this plugin name to an implementation.
    #[error("no plugin definition found for [{0}]")]
    DefinitionNotFound(String),

    /// No load scope could construct the implementation identity.
    #[error("plugin implementation [{0}] not found")]
    ImplementationNotFound(String),

    /// A plugin spec names a package that is not a loaded plugin path.
    #[error("plugin package [{0}] is not a loaded plugin path")]
    PackageNotFound(String),

    /// A shared library could not be opened or lacks the entry points.
    #[error("failed to load plugin library {path}: {reason}")]
    LibraryLoad { path: PathBuf, reason: String },

    /// A shared library was built against another plugin ABI.
    #[error("plugin library {path} has API version {actual}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    /// Reading plugin resources failed.
    #[error("failed to read plugin resources: {0}")]
    Io(#[from] std::io::Error),

    /// The chain was asked for a config before any plugin ran.
    #[error("no plugin configuration bound at chain position {0}")]
    MissingConfig(usize),

    /// The JSON blob does not decode into the plugin's config type.
    #[error("invalid configuration for plugin {plugin}: {reason}")]
    InvalidConfig { plugin: String, reason: String },

    /// A switch was requested with a different value type than it holds.
    #[error("switch {name} in group {group} holds a different value type")]
    SwitchTypeMismatch { group: String, name: String },

    /// A plugin failed while handling a request.
    #[error("plugin {plugin} failed: {reason}")]
    Execution { plugin: String, reason: String },
}

impl PluginError {
    pub fn execution(plugin: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Execution {
            plugin: plugin.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while turning one route definition into a runtime route.
#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("route {0} has no cluster")]
    MissingCluster(i64),

    #[error("route {0} has no group")]
    MissingGroup(i64),

    #[error("route {0} has no predicate")]
    MissingPredicate(i64),

    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

/// Errors that abort a whole locator refresh.
#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("failed to read route definitions from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse route definitions from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("route definition {id} rejected in strict mode: {source}")]
    Strict {
        id: i64,
        #[source]
        source: RouteBuildError,
    },

    #[error("route definition source failed: {0}")]
    Source(String),
}

/// Errors returned to callers of a refresh handle.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    /// The refresh tasks have stopped.
    #[error("refresh pipeline is closed")]
    Closed,

    #[error("definition refresh failed: {0}")]
    Definitions(String),

    #[error("route refresh failed: {0}")]
    Routes(String),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Predicate(#[from] PredicateError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    RouteBuild(#[from] RouteBuildError),

    #[error(transparent)]
    Locator(#[from] LocatorError),

    #[error(transparent)]
    Refresh(#[from] RefreshError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to watch route files: {0}")]
    Watch(#[from] notify::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
