//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route compilation (every refresh):
//!     RouteDefinition (definition.rs)
//!     → predicates bound by the factory registry
//!     → builder.rs (plugins resolved through the loader)
//!     → Route (route.rs), immutable, shared via Arc
//!
//! Request time:
//!     dispatcher.rs
//!     → cached route snapshot, ascending order
//!     → first predicate that accepts the request
//!     → plugin chain of that route
//! ```
//!
//! # Design Decisions
//! - Routes are rebuilt as a whole table, never patched in place
//! - Deterministic: same table and request always select the same route
//! - First match wins (ordered by the order key, stable)

pub mod builder;
pub mod definition;
pub mod dispatcher;
pub mod route;

pub use builder::RouteBuilder;
pub use definition::{ApiCluster, ApiGroup, PluginSpec, PredicateArgs, PredicateSpec, RouteDefinition};
pub use dispatcher::Dispatcher;
pub use route::Route;
