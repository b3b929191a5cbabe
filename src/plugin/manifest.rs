//! Plugin definition manifests.
//!
//! A manifest (`gateway-plugin.def`) maps plugin names to implementation
//! identities, one `name=identity` per line:
//!
//! ```text
//! # comment
//! AddRequestHeader=gateway.builtin.add-request-header
//! RateGuard=acme.rate-guard
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. Lines that do not
//! split into exactly two parts are logged and skipped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PluginError;

pub const MANIFEST_FILE_NAME: &str = "gateway-plugin.def";

/// One parsed manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDefinition {
    pub name: String,
    pub identity: String,
}

impl PluginDefinition {
    /// Parse `name=identity`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split('=');
        let (Some(name), Some(identity), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        let (name, identity) = (name.trim(), identity.trim());
        if name.is_empty() || identity.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            identity: identity.to_string(),
        })
    }
}

/// Where a manifest came from.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    Builtin(&'static str),
    File(PathBuf),
}

impl ManifestSource {
    fn label(&self) -> String {
        match self {
            ManifestSource::Builtin(_) => "builtin".to_string(),
            ManifestSource::File(path) => path.display().to_string(),
        }
    }

    fn read(&self) -> Result<String, PluginError> {
        match self {
            ManifestSource::Builtin(text) => Ok(text.to_string()),
            ManifestSource::File(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// Merged name → identity table across all manifests.
#[derive(Debug, Default)]
pub struct PluginDefinitionTable {
    definitions: BTreeMap<String, String>,
}

impl PluginDefinitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole table with the contents of `sources`.
    ///
    /// Later manifests override earlier ones on duplicate names.
    pub fn load(&mut self, sources: &[ManifestSource]) -> Result<(), PluginError> {
        self.definitions.clear();
        for source in sources {
            let text = source.read()?;
            tracing::info!(manifest = %source.label(), "Found plugin definitions");
            self.merge(&text, &source.label());
        }
        Ok(())
    }

    fn merge(&mut self, text: &str, origin: &str) {
        for line in text.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            match PluginDefinition::parse(line) {
                Some(def) => {
                    self.definitions.insert(def.name, def.identity);
                }
                None => {
                    tracing::error!(manifest = %origin, line = %line, "Failed to parse plugin definition");
                }
            }
        }
    }

    /// Add or replace a single definition.
    pub fn insert(&mut self, name: &str, identity: &str) {
        self.definitions
            .insert(name.to_string(), identity.to_string());
    }

    /// The implementation identity registered for `name`.
    pub fn identity(&self, name: &str) -> Option<&str> {
        self.definitions.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.definitions
            .iter()
            .map(|(name, identity)| (name.as_str(), identity.as_str()))
    }
}

/// The manifest inside a plugin path, if there is one.
pub fn manifest_in(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(MANIFEST_FILE_NAME);
    path.is_file().then_some(path)
}
