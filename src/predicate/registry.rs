//! Predicate factory registry and argument binding.
//!
//! # Responsibilities
//! - Map the enumerated predicate type names to factories
//! - Normalize shortcut (`Name=a,b`) and named arguments into one JSON object
//! - Bind that object into a factory's typed config and validate it
//!
//! # Design Decisions
//! - Factories are trait objects keyed by `PredicateKind`, registered once at startup
//! - Binding goes through serde, so configs are plain `Deserialize` structs
//! - Unknown names and unregistered kinds are distinct errors

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::PredicateError;
use crate::predicate::{fields, host, path, remote_addr, time, Predicate};
use crate::routing::definition::{PredicateArgs, PredicateSpec};

/// The fixed set of predicate types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateKind {
    After,
    Before,
    Between,
    Cookie,
    Header,
    Host,
    Method,
    Path,
    Query,
    RemoteAddr,
    XForwardedRemoteAddr,
}

impl PredicateKind {
    pub const ALL: [PredicateKind; 11] = [
        PredicateKind::After,
        PredicateKind::Before,
        PredicateKind::Between,
        PredicateKind::Cookie,
        PredicateKind::Header,
        PredicateKind::Host,
        PredicateKind::Method,
        PredicateKind::Path,
        PredicateKind::Query,
        PredicateKind::RemoteAddr,
        PredicateKind::XForwardedRemoteAddr,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PredicateKind::After => "After",
            PredicateKind::Before => "Before",
            PredicateKind::Between => "Between",
            PredicateKind::Cookie => "Cookie",
            PredicateKind::Header => "Header",
            PredicateKind::Host => "Host",
            PredicateKind::Method => "Method",
            PredicateKind::Path => "Path",
            PredicateKind::Query => "Query",
            PredicateKind::RemoteAddr => "RemoteAddr",
            PredicateKind::XForwardedRemoteAddr => "XForwardedRemoteAddr",
        }
    }
}

impl FromStr for PredicateKind {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| PredicateError::UnknownPredicate(s.to_string()))
    }
}

impl fmt::Display for PredicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How positional shortcut arguments map onto config fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutType {
    /// One argument per field, in field order.
    Default,
    /// All arguments gathered into a list under the single field.
    GatherList,
    /// Like `GatherList`, but a trailing `true`/`false` sets the second field.
    GatherListTailFlag,
}

/// Typed predicate configuration.
pub trait PredicateConfig: DeserializeOwned {
    /// Semantic checks after binding.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Builds one kind of predicate from bound arguments.
pub trait PredicateFactory: Send + Sync {
    fn kind(&self) -> PredicateKind;

    fn shortcut_type(&self) -> ShortcutType {
        ShortcutType::Default
    }

    /// Config field names, in shortcut argument order.
    fn shortcut_fields(&self) -> &'static [&'static str];

    /// Bind and validate `args`, then produce the predicate.
    fn apply(&self, args: &Value) -> Result<Predicate, PredicateError>;
}

/// Deserialize `args` into `C` and run its validation.
pub fn bind<C: PredicateConfig>(kind: PredicateKind, args: &Value) -> Result<C, PredicateError> {
    let config: C = serde_json::from_value(args.clone())
        .map_err(|e| PredicateError::invalid(kind.name(), e))?;
    config
        .validate()
        .map_err(|reason| PredicateError::invalid(kind.name(), reason))?;
    Ok(config)
}

/// Turn a spec's arguments into the named JSON object a factory binds from.
pub fn normalize_args(
    factory: &dyn PredicateFactory,
    args: &PredicateArgs,
) -> Result<Value, PredicateError> {
    let values = match args {
        PredicateArgs::Named(map) => return Ok(Value::Object(map.clone())),
        PredicateArgs::Positional(values) => values,
    };

    let fields = factory.shortcut_fields();
    let name = factory.kind().name();
    let mut map = Map::new();

    match factory.shortcut_type() {
        ShortcutType::Default => {
            if values.len() > fields.len() {
                return Err(PredicateError::invalid(
                    name,
                    format!(
                        "expected at most {} arguments, got {}",
                        fields.len(),
                        values.len()
                    ),
                ));
            }
            for (field, value) in fields.iter().zip(values) {
                map.insert(field.to_string(), Value::String(value.clone()));
            }
        }
        ShortcutType::GatherList => {
            let field = fields.first().ok_or_else(|| {
                PredicateError::invalid(name, "shortcut list requires one field")
            })?;
            map.insert(field.to_string(), string_list(values));
        }
        ShortcutType::GatherListTailFlag => {
            let [list_field, flag_field] = fields else {
                return Err(PredicateError::invalid(
                    name,
                    "shortcut tail flag requires two fields",
                ));
            };
            let mut values = values.as_slice();
            if let Some((last, rest)) = values.split_last() {
                if let Ok(flag) = last.to_ascii_lowercase().parse::<bool>() {
                    map.insert(flag_field.to_string(), Value::Bool(flag));
                    values = rest;
                }
            }
            map.insert(list_field.to_string(), string_list(values));
        }
    }

    Ok(Value::Object(map))
}

fn string_list(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

/// A predicate built from a spec, with the arguments it was bound from.
#[derive(Debug)]
pub struct BoundPredicate {
    pub predicate: Predicate,
    pub args: Value,
}

/// Registry of predicate factories.
#[derive(Clone, Default)]
pub struct PredicateFactoryRegistry {
    factories: HashMap<PredicateKind, Arc<dyn PredicateFactory>>,
}

impl PredicateFactoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in factory.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(time::TimeFactory::After);
        registry.register(time::TimeFactory::Before);
        registry.register(time::TimeFactory::Between);
        registry.register(fields::FieldFactory(fields::Field::Cookie));
        registry.register(fields::FieldFactory(fields::Field::Header));
        registry.register(host::HostFactory);
        registry.register(fields::MethodFactory);
        registry.register(path::PathFactory);
        registry.register(fields::FieldFactory(fields::Field::Query));
        registry.register(remote_addr::RemoteAddrFactory);
        registry.register(remote_addr::XForwardedRemoteAddrFactory);
        registry
    }

    /// Register a factory, replacing any previous one of the same kind.
    pub fn register(&mut self, factory: impl PredicateFactory + 'static) {
        self.factories.insert(factory.kind(), Arc::new(factory));
    }

    pub fn get(&self, kind: PredicateKind) -> Option<&Arc<dyn PredicateFactory>> {
        self.factories.get(&kind)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Build one predicate from its spec.
    pub fn build(&self, spec: &PredicateSpec) -> Result<BoundPredicate, PredicateError> {
        let kind: PredicateKind = spec.name.parse()?;
        let factory = self
            .get(kind)
            .ok_or_else(|| PredicateError::FactoryNotRegistered(spec.name.clone()))?;

        let args = normalize_args(factory.as_ref(), &spec.args)?;
        tracing::debug!(predicate = %kind, args = %args, "Applying predicate arguments");
        let predicate = factory.apply(&args)?;
        Ok(BoundPredicate { predicate, args })
    }
}

impl fmt::Debug for PredicateFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().map(|k| k.name()).collect();
        kinds.sort_unstable();
        f.debug_struct("PredicateFactoryRegistry")
            .field("factories", &kinds)
            .finish()
    }
}
