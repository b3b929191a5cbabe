//! Route construction.
//!
//! # Responsibilities
//! - Collect a route's identity fields, its predicate tree and its plugin specs
//! - Resolve plugin specs through the loader at build time
//! - Reject routes without a group, cluster or predicate
//!
//! # Design Decisions
//! - Plain builder with one fallible terminal `build`; nothing is resolved
//!   before all parts are known
//! - The predicate is composed here, so callers can chain `and`/`or`/`negate`

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::RouteBuildError;
use crate::plugin::PluginLoader;
use crate::predicate::Predicate;
use crate::routing::definition::{route_identity, ApiCluster, ApiGroup, PluginSpec, RouteDefinition};
use crate::routing::route::Route;

/// Builder for [`Route`].
#[derive(Debug, Default)]
pub struct RouteBuilder {
    id: i64,
    order: i32,
    version: i32,
    name: String,
    memo: Option<String>,
    group: Option<ApiGroup>,
    cluster: Option<ApiCluster>,
    predicate: Option<Predicate>,
    plugins: Vec<PluginSpec>,
    metadata: HashMap<String, Value>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl RouteBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Copy every field except the predicates, which need the factory registry.
    pub fn from_definition(definition: &RouteDefinition) -> Self {
        Self {
            id: definition.id,
            order: definition.order,
            version: definition.version,
            name: definition.name.clone(),
            memo: definition.memo.clone(),
            group: definition.group.clone(),
            cluster: definition.cluster.clone(),
            predicate: None,
            plugins: definition.plugins.clone(),
            metadata: definition.metadata.clone(),
            created_at: definition.created_at,
            updated_at: definition.updated_at,
        }
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn group(mut self, group: ApiGroup) -> Self {
        self.group = Some(group);
        self
    }

    pub fn cluster(mut self, cluster: ApiCluster) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Replace the predicate.
    pub fn predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// AND `predicate` onto the current one, or set it if there is none.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(current) => current.and(predicate),
            None => predicate,
        });
        self
    }

    /// OR `predicate` onto the current one, or set it if there is none.
    pub fn or(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(current) => current.or(predicate),
            None => predicate,
        });
        self
    }

    /// Negate the current predicate.
    pub fn negate(mut self) -> Self {
        self.predicate = self.predicate.take().map(Predicate::negate);
        self
    }

    pub fn plugin(mut self, spec: PluginSpec) -> Self {
        self.plugins.push(spec);
        self
    }

    /// Resolve plugins and produce the route.
    pub fn build(self, loader: &PluginLoader) -> Result<Route, RouteBuildError> {
        let cluster = self.cluster.ok_or(RouteBuildError::MissingCluster(self.id))?;
        let group = self.group.ok_or(RouteBuildError::MissingGroup(self.id))?;
        let predicate = self
            .predicate
            .ok_or(RouteBuildError::MissingPredicate(self.id))?;

        let plugins = self
            .plugins
            .iter()
            .map(|spec| loader.resolve(spec))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Route {
            identity: route_identity(self.id, &cluster, &group),
            id: self.id,
            order: self.order,
            version: self.version,
            name: self.name,
            memo: self.memo,
            group,
            cluster,
            predicate,
            plugins,
            metadata: self.metadata,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::plugin::CapableSwitchManager;
    use crate::predicate::testing::exchange;
    use std::sync::Arc;

    fn loader() -> PluginLoader {
        PluginLoader::builtin_only(Arc::new(CapableSwitchManager::new()))
    }

    fn group() -> ApiGroup {
        ApiGroup {
            id: 3,
            ..Default::default()
        }
    }

    fn cluster() -> ApiCluster {
        ApiCluster {
            id: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_route() {
        let route = RouteBuilder::new(7)
            .order(2)
            .name("users")
            .group(group())
            .cluster(cluster())
            .predicate(Predicate::always())
            .plugin(PluginSpec::new("AddRequestHeader", r#"{"name":"X-A","value":"1"}"#))
            .build(&loader())
            .unwrap();

        assert_eq!(route.identity(), "7_5_3");
        assert_eq!(route.order(), 2);
        assert_eq!(route.plugins().len(), 1);
        assert_eq!(
            route.plugins()[0].identity(),
            "gateway.builtin.add-request-header"
        );
    }

    #[test]
    fn test_missing_parts() {
        let loader = loader();
        let err = RouteBuilder::new(1)
            .group(group())
            .predicate(Predicate::always())
            .build(&loader)
            .unwrap_err();
        assert!(matches!(err, RouteBuildError::MissingCluster(1)));

        let err = RouteBuilder::new(1)
            .cluster(cluster())
            .predicate(Predicate::always())
            .build(&loader)
            .unwrap_err();
        assert!(matches!(err, RouteBuildError::MissingGroup(1)));

        let err = RouteBuilder::new(1)
            .group(group())
            .cluster(cluster())
            .build(&loader)
            .unwrap_err();
        assert!(matches!(err, RouteBuildError::MissingPredicate(1)));
    }

    #[test]
    fn test_unknown_plugin_fails_route() {
        let err = RouteBuilder::new(1)
            .group(group())
            .cluster(cluster())
            .predicate(Predicate::always())
            .plugin(PluginSpec::new("Nope", "{}"))
            .build(&loader())
            .unwrap_err();
        assert!(matches!(
            err,
            RouteBuildError::Plugin(PluginError::DefinitionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_predicate_composition() {
        let route = RouteBuilder::new(1)
            .group(group())
            .cluster(cluster())
            .and(Predicate::always())
            .and(Predicate::from_fn("Never", |_| false))
            .negate()
            .or(Predicate::from_fn("Never", |_| false))
            .build(&loader())
            .unwrap();

        assert_eq!(route.predicate().to_string(), "(!(Always && Never) || Never)");
        let mut ex = exchange("/");
        assert!(route.predicate().evaluate(&mut ex).await.unwrap());
    }
}
