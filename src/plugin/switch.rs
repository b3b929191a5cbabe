//! Capable switches: named, typed runtime toggles grouped by owner.
//!
//! # Design Decisions
//! - Groups and switches are created on first access and never removed
//! - A switch's type is fixed by whoever touches it first; asking for it with
//!   another type is an error rather than a silent reset
//! - The first `value_or` read stores its default, later reads see that value

use dashmap::DashMap;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::PluginError;

/// One typed toggle.
pub struct CapableSwitch<V> {
    name: String,
    value: RwLock<Option<V>>,
}

impl<V: Clone> CapableSwitch<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, or store and return `default` if none is set yet.
    pub fn value_or(&self, default: V) -> V {
        if let Some(value) = self.value() {
            return value;
        }
        let mut slot = self.value.write().unwrap_or_else(|e| e.into_inner());
        slot.get_or_insert(default).clone()
    }

    pub fn value(&self) -> Option<V> {
        self.value
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set(&self, value: V) {
        *self.value.write().unwrap_or_else(|e| e.into_inner()) = Some(value);
    }
}

impl<V: Clone + fmt::Debug> fmt::Debug for CapableSwitch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapableSwitch")
            .field("name", &self.name)
            .field("value", &self.value())
            .finish()
    }
}

/// Type-erased view of a switch for storage and listing.
trait ErasedSwitch: Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn render(&self) -> Option<String>;
}

impl<V> ErasedSwitch for CapableSwitch<V>
where
    V: Clone + fmt::Debug + Send + Sync + 'static,
{
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn render(&self) -> Option<String> {
        self.value().map(|v| format!("{:?}", v))
    }
}

/// A switch advertised by a plugin when it is instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchDescriptor {
    pub name: String,
    pub description: String,
}

impl SwitchDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Snapshot of one switch for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SwitchSnapshot {
    pub name: String,
    pub description: Option<String>,
    pub value: Option<String>,
}

/// Switches owned by one namespace, usually a plugin identity.
pub struct SwitchGroup {
    name: String,
    switches: DashMap<String, Arc<dyn ErasedSwitch>>,
    descriptions: DashMap<String, String>,
}

impl SwitchGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            switches: DashMap::new(),
            descriptions: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get or create the switch `name` holding values of type `V`.
    pub fn switch<V>(&self, name: &str) -> Result<Arc<CapableSwitch<V>>, PluginError>
    where
        V: Clone + fmt::Debug + Send + Sync + 'static,
    {
        let erased = self
            .switches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CapableSwitch::<V>::new(name)) as Arc<dyn ErasedSwitch>)
            .clone();

        erased
            .into_any()
            .downcast::<CapableSwitch<V>>()
            .map_err(|_| PluginError::SwitchTypeMismatch {
                group: self.name.clone(),
                name: name.to_string(),
            })
    }

    /// Record a description for a switch, without fixing its type.
    pub fn describe(&self, descriptor: &SwitchDescriptor) {
        self.descriptions
            .insert(descriptor.name.clone(), descriptor.description.clone());
    }

    pub fn snapshot(&self) -> Vec<SwitchSnapshot> {
        let mut names: Vec<String> = self
            .switches
            .iter()
            .map(|e| e.key().clone())
            .chain(self.descriptions.iter().map(|e| e.key().clone()))
            .collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .map(|name| SwitchSnapshot {
                description: self.descriptions.get(&name).map(|d| d.value().clone()),
                value: self.switches.get(&name).and_then(|s| s.value().render()),
                name,
            })
            .collect()
    }
}

/// Process-wide registry of switch groups.
#[derive(Default)]
pub struct CapableSwitchManager {
    groups: DashMap<String, Arc<SwitchGroup>>,
}

impl CapableSwitchManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the group `name`.
    pub fn group(&self, name: &str) -> Arc<SwitchGroup> {
        self.groups
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SwitchGroup::new(name)))
            .clone()
    }

    /// The group `name`, if anything created it.
    pub fn existing_group(&self, name: &str) -> Option<Arc<SwitchGroup>> {
        self.groups.get(name).map(|g| g.value().clone())
    }

    /// Register descriptors exported by a plugin under its identity.
    pub fn register_exported(&self, owner: &str, descriptors: &[SwitchDescriptor]) {
        if descriptors.is_empty() {
            return;
        }
        let group = self.group(owner);
        for descriptor in descriptors {
            group.describe(descriptor);
        }
        tracing::debug!(group = %owner, count = descriptors.len(), "Registered exported switches");
    }

    /// All groups and their switches, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, Vec<SwitchSnapshot>)> {
        let mut groups: Vec<_> = self
            .groups
            .iter()
            .map(|g| (g.key().clone(), g.value().snapshot()))
            .collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }
}

impl fmt::Debug for CapableSwitchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapableSwitchManager")
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_read_fixes_default() {
        let switch = CapableSwitch::<String>::new("mode");
        assert_eq!(switch.value(), None);
        assert_eq!(switch.value_or("fast".into()), "fast");
        assert_eq!(switch.value_or("slow".into()), "fast");

        switch.set("slow".into());
        assert_eq!(switch.value_or("fast".into()), "slow");
    }

    #[test]
    fn test_group_returns_same_switch() {
        let manager = CapableSwitchManager::new();
        let a = manager.group("acme.plugin").switch::<i64>("age").unwrap();
        a.set(3);
        let b = manager.group("acme.plugin").switch::<i64>("age").unwrap();
        assert_eq!(b.value(), Some(3));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_type_mismatch() {
        let manager = CapableSwitchManager::new();
        manager.group("g").switch::<String>("s").unwrap();
        let err = manager.group("g").switch::<i32>("s").unwrap_err();
        assert!(matches!(err, PluginError::SwitchTypeMismatch { .. }));
    }

    #[test]
    fn test_exported_descriptors_in_snapshot() {
        let manager = CapableSwitchManager::new();
        assert!(manager.existing_group("p").is_none());
        manager.register_exported("p", &[SwitchDescriptor::new("NO1", "first switch")]);
        manager.group("p").switch::<u32>("age").unwrap().set(7);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 1);
        let (group, switches) = &snapshot[0];
        assert_eq!(group, "p");
        assert_eq!(switches.len(), 2);
        assert_eq!(switches[0].name, "NO1");
        assert_eq!(switches[0].description.as_deref(), Some("first switch"));
        assert_eq!(switches[1].value.as_deref(), Some("7"));
    }
}
