//! Route locators.
//!
//! # Responsibilities
//! - Convert definitions into runtime routes (predicates + plugins)
//! - Skip definitions that fail to convert, or abort in strict mode
//! - Cache the last good route table behind an `ArcSwap`
//!
//! # Design Decisions
//! - Predicates of one definition are AND-ed in declaration order; a
//!   definition without predicates matches every request
//! - Refreshes are serialized by a mutex; readers never take it

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{LocatorError, RouteBuildError};
use crate::locator::events::{EventBus, GatewayEvent};
use crate::locator::{RouteDefinitionLocator, RouteLocator};
use crate::plugin::PluginLoader;
use crate::predicate::{Predicate, PredicateFactoryRegistry};
use crate::routing::builder::RouteBuilder;
use crate::routing::definition::{route_identity, RouteDefinition};
use crate::routing::route::Route;

/// Builds routes from a definition locator.
pub struct DefaultRouteLocator {
    definitions: Arc<dyn RouteDefinitionLocator>,
    registry: Arc<PredicateFactoryRegistry>,
    loader: Arc<PluginLoader>,
    events: EventBus,
    strict: bool,
}

impl DefaultRouteLocator {
    pub fn new(
        definitions: Arc<dyn RouteDefinitionLocator>,
        registry: Arc<PredicateFactoryRegistry>,
        loader: Arc<PluginLoader>,
        events: EventBus,
    ) -> Self {
        Self {
            definitions,
            registry,
            loader,
            events,
            strict: false,
        }
    }

    /// Abort the whole conversion when any definition fails.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Convert one definition.
    pub fn convert(&self, definition: &RouteDefinition) -> Result<Route, RouteBuildError> {
        let identity = match (&definition.cluster, &definition.group) {
            (Some(cluster), Some(group)) => route_identity(definition.id, cluster, group),
            _ => definition.id.to_string(),
        };

        let mut predicate: Option<Predicate> = None;
        for spec in &definition.predicates {
            let bound = self.registry.build(spec)?;
            self.events.publish(GatewayEvent::PredicateArgsObserved {
                route_identity: identity.clone(),
                args: bound.args,
            });
            predicate = Some(match predicate {
                Some(current) => current.and(bound.predicate),
                None => bound.predicate,
            });
        }

        RouteBuilder::from_definition(definition)
            .predicate(predicate.unwrap_or_else(Predicate::always))
            .build(&self.loader)
    }
}

#[async_trait]
impl RouteLocator for DefaultRouteLocator {
    async fn routes(&self) -> Result<Vec<Arc<Route>>, LocatorError> {
        let definitions = self.definitions.definitions().await?;
        let mut routes = Vec::with_capacity(definitions.len());
        for definition in &definitions {
            match self.convert(definition) {
                Ok(route) => {
                    tracing::debug!(route = %route.identity(), predicate = %route.predicate(), "Built route");
                    routes.push(Arc::new(route));
                }
                Err(source) if self.strict => {
                    return Err(LocatorError::Strict {
                        id: definition.id,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(route_id = definition.id, error = %e, "Skipping route definition");
                }
            }
        }
        Ok(routes)
    }
}

/// Concatenation of several route locators.
#[derive(Default)]
pub struct CompositeRouteLocator {
    delegates: Vec<Arc<dyn RouteLocator>>,
}

impl CompositeRouteLocator {
    pub fn new(delegates: Vec<Arc<dyn RouteLocator>>) -> Self {
        Self { delegates }
    }
}

#[async_trait]
impl RouteLocator for CompositeRouteLocator {
    async fn routes(&self) -> Result<Vec<Arc<Route>>, LocatorError> {
        let mut all = Vec::new();
        for delegate in &self.delegates {
            all.extend(delegate.routes().await?);
        }
        Ok(all)
    }
}

/// Last good route table, sorted by order.
pub struct CachingRouteLocator {
    delegate: Arc<dyn RouteLocator>,
    cache: ArcSwap<Vec<Arc<Route>>>,
    refresh_lock: Mutex<()>,
}

impl CachingRouteLocator {
    pub fn new(delegate: Arc<dyn RouteLocator>) -> Self {
        Self {
            delegate,
            cache: ArcSwap::from_pointee(Vec::new()),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Rebuild the table from the delegate. On error the old table stays.
    pub async fn refresh(&self) -> Result<usize, LocatorError> {
        let _guard = self.refresh_lock.lock().await;
        let mut routes = self.delegate.routes().await?;
        routes.sort_by_key(|r| r.order());
        let count = routes.len();
        self.cache.store(Arc::new(routes));
        Ok(count)
    }

    /// The current table. Holding it keeps that generation alive.
    pub fn snapshot(&self) -> Arc<Vec<Arc<Route>>> {
        self.cache.load_full()
    }
}

#[async_trait]
impl RouteLocator for CachingRouteLocator {
    async fn routes(&self) -> Result<Vec<Arc<Route>>, LocatorError> {
        Ok(self.cache.load().as_ref().clone())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::locator::definition::InMemoryDefinitionSource;
    use crate::plugin::CapableSwitchManager;
    use crate::routing::definition::{ApiCluster, ApiGroup, PredicateSpec};

    pub fn definition(id: i64, order: i32, predicates: &[&str]) -> RouteDefinition {
        RouteDefinition {
            id,
            order,
            group: Some(ApiGroup {
                id: 1,
                ..Default::default()
            }),
            cluster: Some(ApiCluster {
                id: 1,
                ..Default::default()
            }),
            predicates: predicates
                .iter()
                .map(|p| PredicateSpec::parse(p).unwrap())
                .collect(),
            ..Default::default()
        }
    }

    pub fn locator(definitions: Vec<RouteDefinition>) -> DefaultRouteLocator {
        DefaultRouteLocator::new(
            Arc::new(InMemoryDefinitionSource::new(definitions)),
            Arc::new(PredicateFactoryRegistry::with_defaults()),
            Arc::new(PluginLoader::builtin_only(Arc::new(CapableSwitchManager::new()))),
            EventBus::default(),
        )
    }
}
