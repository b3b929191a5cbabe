//! Declarative route definitions.
//!
//! # Responsibilities
//! - Describe a route as data: identity, ordering, owning group and cluster,
//!   predicate specs and plugin specs
//! - Accept the compact TOML forms (`"Path=/a,/b"` predicates, table or string
//!   plugin configs) and normalize them on deserialization
//!
//! # Design Decisions
//! - Definitions are immutable values; sources produce fresh ones on every fetch
//! - Predicate arguments stay untyped here, binding happens in the registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PredicateError;

/// Group owning a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiGroup {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memo: Option<String>,
}

/// Cluster a route is deployed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCluster {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
}

/// Predicate arguments: positional shortcut values or named values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateArgs {
    Positional(Vec<String>),
    Named(Map<String, Value>),
}

impl Default for PredicateArgs {
    fn default() -> Self {
        PredicateArgs::Named(Map::new())
    }
}

/// One predicate of a route, by registry name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPredicateSpec")]
pub struct PredicateSpec {
    pub name: String,
    pub args: PredicateArgs,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawPredicateSpec {
    Shorthand(String),
    Table {
        name: String,
        #[serde(default)]
        args: PredicateArgs,
    },
}

impl TryFrom<RawPredicateSpec> for PredicateSpec {
    type Error = PredicateError;

    fn try_from(raw: RawPredicateSpec) -> Result<Self, Self::Error> {
        match raw {
            RawPredicateSpec::Shorthand(text) => text.parse(),
            RawPredicateSpec::Table { name, args } => Ok(PredicateSpec { name, args }),
        }
    }
}

impl PredicateSpec {
    pub fn new(name: impl Into<String>, args: PredicateArgs) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// Parse the `Name=arg1,arg2` shorthand. Blank arguments are dropped.
    pub fn parse(text: &str) -> Result<Self, PredicateError> {
        text.parse()
    }
}

impl FromStr for PredicateSpec {
    type Err = PredicateError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let (name, args) = text.split_once('=').ok_or_else(|| {
            PredicateError::invalid(text, "unable to parse predicate text, expected Name=args")
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PredicateError::invalid(text, "predicate name is empty"));
        }
        let args = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self::new(name, PredicateArgs::Positional(args)))
    }
}

impl fmt::Display for PredicateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            PredicateArgs::Positional(values) => write!(f, "{}={}", self.name, values.join(",")),
            PredicateArgs::Named(map) => write!(f, "{}={}", self.name, Value::Object(map.clone())),
        }
    }
}

/// One plugin of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    /// JSON configuration blob, decoded by the plugin on demand.
    #[serde(default = "empty_config", deserialize_with = "config_blob")]
    pub config: String,
    /// Implementation identity; resolved from the manifests when absent.
    #[serde(default)]
    pub implementation: Option<String>,
    /// Plugin path (by directory name) that must provide the implementation.
    #[serde(default)]
    pub package: Option<String>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: config.into(),
            implementation: None,
            package: None,
        }
    }
}

fn empty_config() -> String {
    "{}".to_string()
}

/// Accept either a JSON string or a structured table.
fn config_blob<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        other => serde_json::to_string(&other).map_err(serde::de::Error::custom),
    }
}

/// Declarative description of one route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteDefinition {
    pub id: i64,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub group: Option<ApiGroup>,
    #[serde(default)]
    pub cluster: Option<ApiCluster>,
    #[serde(default)]
    pub predicates: Vec<PredicateSpec>,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Route identity: `id_clusterId_groupId`.
pub fn route_identity(id: i64, cluster: &ApiCluster, group: &ApiGroup) -> String {
    format!("{}_{}_{}", id, cluster.id, group.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shorthand() {
        let spec = PredicateSpec::parse("Path=/a, /b ,,").unwrap();
        assert_eq!(spec.name, "Path");
        assert_eq!(
            spec.args,
            PredicateArgs::Positional(vec!["/a".into(), "/b".into()])
        );
        assert_eq!(spec.to_string(), "Path=/a,/b");

        assert!(PredicateSpec::parse("Path").is_err());
        assert!(PredicateSpec::parse("=x").is_err());
    }

    #[test]
    fn test_deserialize_route_from_toml() {
        let text = r#"
            id = 7
            order = 2
            name = "users"
            predicates = [
                "Path=/users/{id}",
                { name = "Header", args = { header = "X-Tenant", regexp = "\\w+" } },
                { name = "Method", args = ["GET", "POST"] },
            ]

            [group]
            id = 3
            name = "core"

            [cluster]
            id = 5
            name = "east"

            [[plugins]]
            name = "AddRequestHeader"
            config = { name = "X-A", value = "1" }

            [[plugins]]
            name = "Custom"
            config = '{"k":true}'
            implementation = "acme.custom"
        "#;
        let def: RouteDefinition = toml::from_str(text).unwrap();
        assert_eq!(def.id, 7);
        assert_eq!(def.predicates.len(), 3);
        assert_eq!(def.predicates[0].name, "Path");
        assert!(matches!(def.predicates[1].args, PredicateArgs::Named(_)));
        assert!(matches!(def.predicates[2].args, PredicateArgs::Positional(_)));

        let config: Value = serde_json::from_str(&def.plugins[0].config).unwrap();
        assert_eq!(config["name"], "X-A");
        assert_eq!(def.plugins[1].config, r#"{"k":true}"#);
        assert_eq!(def.plugins[1].implementation.as_deref(), Some("acme.custom"));

        let group = def.group.unwrap();
        let cluster = def.cluster.unwrap();
        assert_eq!(route_identity(def.id, &cluster, &group), "7_5_3");
    }

    #[test]
    fn test_plugin_config_defaults_to_empty_object() {
        let spec: PluginSpec = serde_json::from_value(serde_json::json!({"name": "X"})).unwrap();
        assert_eq!(spec.config, "{}");
    }
}
