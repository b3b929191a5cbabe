//! Runtime route.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::plugin::PluginInstance;
use crate::predicate::Predicate;
use crate::routing::definition::{ApiCluster, ApiGroup};

/// An immutable, fully resolved route.
///
/// Built once per refresh by [`RouteBuilder`](crate::routing::builder::RouteBuilder)
/// and shared through `Arc` by every request that reads the route table.
pub struct Route {
    pub(crate) id: i64,
    pub(crate) identity: String,
    pub(crate) order: i32,
    pub(crate) version: i32,
    pub(crate) name: String,
    pub(crate) memo: Option<String>,
    pub(crate) group: ApiGroup,
    pub(crate) cluster: ApiCluster,
    pub(crate) predicate: Predicate,
    pub(crate) plugins: Vec<PluginInstance>,
    pub(crate) metadata: HashMap<String, Value>,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
}

impl Route {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// `id_clusterId_groupId`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn memo(&self) -> Option<&str> {
        self.memo.as_deref()
    }

    pub fn group(&self) -> &ApiGroup {
        &self.group
    }

    pub fn cluster(&self) -> &ApiCluster {
        &self.cluster
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn plugins(&self) -> &[PluginInstance] {
        &self.plugins
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("identity", &self.identity)
            .field("order", &self.order)
            .field("predicate", &self.predicate.to_string())
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route[{}] order={} {}", self.identity, self.order, self.predicate)
    }
}
