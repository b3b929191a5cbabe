//! Locator pipelines.
//!
//! # Data Flow
//! ```text
//! Definitions:
//!     InMemoryDefinitionSource / FileDefinitionSource
//!     → CompositeDefinitionLocator (concatenate in order)
//!     → CachingDefinitionLocator (stable sort by order, atomic swap)
//!
//! Routes:
//!     CachingDefinitionLocator
//!     → DefaultRouteLocator (predicates + plugins → Route, skip failures)
//!     → CompositeRouteLocator
//!     → CachingRouteLocator (stable sort by order, atomic swap)
//!     → dispatcher reads the snapshot
//!
//! refresh.rs wires both caches with channels:
//!     trigger → definitions task → watch(seq) → routes task → watch(generation)
//! ```
//!
//! # Design Decisions
//! - Caches keep the last complete snapshot; a failed fetch never clears them
//! - Readers load an `Arc` snapshot and never block on a refresh

pub mod definition;
pub mod events;
pub mod refresh;
pub mod route;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::LocatorError;
use crate::routing::definition::RouteDefinition;
use crate::routing::route::Route;

pub use definition::{
    CachingDefinitionLocator, CompositeDefinitionLocator, FileDefinitionSource,
    InMemoryDefinitionSource,
};
pub use events::{EventBus, GatewayEvent};
pub use refresh::{RefreshHandle, RefreshPipeline};
pub use route::{CachingRouteLocator, CompositeRouteLocator, DefaultRouteLocator};

/// Produces route definitions.
#[async_trait]
pub trait RouteDefinitionLocator: Send + Sync {
    async fn definitions(&self) -> Result<Vec<RouteDefinition>, LocatorError>;
}

/// Produces runtime routes.
#[async_trait]
pub trait RouteLocator: Send + Sync {
    async fn routes(&self) -> Result<Vec<Arc<Route>>, LocatorError>;
}
