//! Plugin resolution and instantiation.
//!
//! # Responsibilities
//! - Build the name → identity table from the built-in manifest, host
//!   registrations and the manifest of every configured plugin path
//! - Keep one load scope per plugin path holding that path's libraries
//! - Construct at most one instance per identity and share it
//!
//! # Data Flow
//! ```text
//! reload():
//!     [plugins].home + [plugins].paths
//!     → manifest_in(path) + libraries_in(path) per path
//!     → new generation (table + scopes), instance map cleared
//!
//! instantiate(identity):
//!     instance map hit → shared instance
//!     miss (under the map's entry lock):
//!         host factories → built-ins → scopes in path order
//!         → register exported switches under the identity
//!
//! instantiate_in(identity, package):
//!     only the scope whose directory is named `package` is searched;
//!     instances are memoized per package and identity
//! ```
//!
//! # Design Decisions
//! - Reloading never invalidates instances already held by routes; a library
//!   stays mapped until its last instance is dropped
//! - A library that fails to open is logged and skipped, the rest still load

use dashmap::DashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::schema::PluginsConfig;
use crate::error::PluginError;
use crate::observability::metrics;
use crate::plugin::abi::{libraries_in, PluginLibrary};
use crate::plugin::builtin::{self, BUILTIN_MANIFEST};
use crate::plugin::manifest::{manifest_in, ManifestSource, PluginDefinitionTable};
use crate::plugin::{CapableSwitchManager, Plugin, PluginInstance};
use crate::routing::definition::PluginSpec;

/// Constructor for a plugin linked into the host binary.
pub type HostFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Libraries loaded from one plugin path. The package name is the last
/// component of the path.
#[derive(Debug)]
pub struct PluginScope {
    dir: PathBuf,
    package: String,
    libraries: Vec<PluginLibrary>,
}

impl PluginScope {
    fn load(dir: &Path) -> Result<Self, PluginError> {
        let mut libraries = Vec::new();
        for path in libraries_in(dir)? {
            match PluginLibrary::open(&path) {
                Ok(library) => libraries.push(library),
                Err(e) => tracing::error!(error = %e, "Skipping plugin library"),
            }
        }
        let package = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            dir: dir.to_path_buf(),
            package,
            libraries,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    fn create(&self, identity: &str) -> Result<Option<Box<dyn Plugin>>, PluginError> {
        for library in &self.libraries {
            if let Some(plugin) = library.create(identity)? {
                tracing::debug!(identity = %identity, library = %library.path().display(), "Created plugin from library");
                return Ok(Some(plugin));
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct Generation {
    number: u64,
    table: PluginDefinitionTable,
    scopes: Vec<PluginScope>,
}

/// Resolves plugin names and hands out shared instances.
pub struct PluginLoader {
    home: PathBuf,
    paths: Vec<PathBuf>,
    switches: Arc<CapableSwitchManager>,
    host: DashMap<String, (String, HostFactory)>,
    generation: RwLock<Generation>,
    instances: DashMap<String, Arc<dyn Plugin>>,
}

impl PluginLoader {
    /// A loader for the configured plugin paths. Call [`reload`](Self::reload)
    /// before resolving anything.
    pub fn new(config: &PluginsConfig, switches: Arc<CapableSwitchManager>) -> Self {
        Self {
            home: config.home.clone(),
            paths: config.paths.clone(),
            switches,
            host: DashMap::new(),
            generation: RwLock::new(Generation::default()),
            instances: DashMap::new(),
        }
    }

    /// A loader that only knows the built-in plugins, already loaded.
    pub fn builtin_only(switches: Arc<CapableSwitchManager>) -> Self {
        let loader = Self::new(&PluginsConfig::default(), switches);
        if let Err(e) = loader.reload() {
            tracing::error!(error = %e, "Failed to load built-in plugin definitions");
        }
        loader
    }

    /// Register a host-linked plugin under `name` → `identity`.
    ///
    /// Registrations survive reloads. Takes effect for name resolution on the
    /// next reload.
    pub fn register(
        &self,
        name: impl Into<String>,
        identity: impl Into<String>,
        factory: impl Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    ) {
        self.host
            .insert(identity.into(), (name.into(), Arc::new(factory)));
    }

    /// Absolute directories of the configured plugin paths.
    pub fn scope_dirs(&self) -> Vec<PathBuf> {
        self.paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { self.home.join(p) })
            .collect()
    }

    /// Rebuild the definition table and load scopes, dropping memoized instances.
    pub fn reload(&self) -> Result<(), PluginError> {
        let mut sources = vec![ManifestSource::Builtin(BUILTIN_MANIFEST)];
        let mut scopes = Vec::new();
        for dir in self.scope_dirs() {
            if !dir.is_dir() {
                tracing::warn!(path = %dir.display(), "Plugin path does not exist, skipping");
                continue;
            }
            if let Some(manifest) = manifest_in(&dir) {
                sources.push(ManifestSource::File(manifest));
            }
            let scope = PluginScope::load(&dir)?;
            tracing::debug!(path = %scope.dir().display(), libraries = scope.libraries.len(), "Plugin scope loaded");
            scopes.push(scope);
        }

        let mut table = PluginDefinitionTable::new();
        table.load(&sources)?;
        for entry in self.host.iter() {
            let (name, _) = entry.value();
            table.insert(name, entry.key());
        }

        let definitions = table.len();
        let libraries: usize = scopes.iter().map(|s| s.libraries.len()).sum();
        let number = {
            let mut generation = self.generation.write().unwrap_or_else(|e| e.into_inner());
            let number = generation.number + 1;
            *generation = Generation {
                number,
                table,
                scopes,
            };
            number
        };
        self.instances.clear();
        metrics::record_plugin_instances(0);

        tracing::info!(
            generation = number,
            definitions,
            libraries,
            "Plugin definitions loaded"
        );
        Ok(())
    }

    /// Map a plugin name to its implementation identity.
    pub fn resolve_identity(&self, name: &str) -> Result<String, PluginError> {
        let generation = self.generation.read().unwrap_or_else(|e| e.into_inner());
        generation
            .table
            .identity(name)
            .map(str::to_string)
            .ok_or_else(|| PluginError::DefinitionNotFound(name.to_string()))
    }

    /// The shared instance for `identity`, constructing it on first use.
    pub fn instantiate(&self, identity: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        self.instantiate_in(identity, None)
    }

    /// Like [`instantiate`](Self::instantiate), but when `package` is set only
    /// the plugin path of that name may provide the implementation.
    pub fn instantiate_in(
        &self,
        identity: &str,
        package: Option<&str>,
    ) -> Result<Arc<dyn Plugin>, PluginError> {
        let key = match package {
            Some(package) => format!("{}/{}", package, identity),
            None => identity.to_string(),
        };
        if let Some(plugin) = self.instances.get(&key) {
            return Ok(plugin.value().clone());
        }

        let plugin = self
            .instances
            .entry(key)
            .or_try_insert_with(|| {
                let plugin = match package {
                    Some(package) => self.construct_in(identity, package)?,
                    None => self.construct(identity)?,
                };
                self.switches
                    .register_exported(identity, &plugin.exported_switches());
                tracing::info!(identity = %identity, "Instantiated plugin");
                Ok::<_, PluginError>(plugin)
            })?
            .value()
            .clone();
        metrics::record_plugin_instances(self.instances.len());
        Ok(plugin)
    }

    fn construct(&self, identity: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        if let Some(entry) = self.host.get(identity) {
            let (_, factory) = entry.value();
            return Ok(factory());
        }
        if let Some(plugin) = builtin::create(identity) {
            return Ok(plugin);
        }

        let generation = self.generation.read().unwrap_or_else(|e| e.into_inner());
        for scope in &generation.scopes {
            if let Some(plugin) = scope.create(identity)? {
                return Ok(Arc::from(plugin));
            }
        }
        Err(PluginError::ImplementationNotFound(identity.to_string()))
    }

    fn construct_in(&self, identity: &str, package: &str) -> Result<Arc<dyn Plugin>, PluginError> {
        let generation = self.generation.read().unwrap_or_else(|e| e.into_inner());
        let scope = generation
            .scopes
            .iter()
            .find(|scope| scope.package() == package)
            .ok_or_else(|| PluginError::PackageNotFound(package.to_string()))?;
        match scope.create(identity)? {
            Some(plugin) => Ok(Arc::from(plugin)),
            None => Err(PluginError::ImplementationNotFound(format!(
                "{} in package {}",
                identity, package
            ))),
        }
    }

    /// Resolve a route's plugin spec into a bound instance.
    pub fn resolve(&self, spec: &PluginSpec) -> Result<PluginInstance, PluginError> {
        let identity = match &spec.implementation {
            Some(identity) => identity.clone(),
            None => self.resolve_identity(&spec.name)?,
        };
        let plugin = self.instantiate_in(&identity, spec.package.as_deref())?;
        Ok(PluginInstance::new(
            spec.name.clone(),
            identity,
            plugin,
            spec.config.as_str(),
        ))
    }

    /// Name → identity pairs of the current generation.
    pub fn definitions(&self) -> Vec<(String, String)> {
        let generation = self.generation.read().unwrap_or_else(|e| e.into_inner());
        generation
            .table
            .iter()
            .map(|(name, identity)| (name.to_string(), identity.to_string()))
            .collect()
    }

    /// Keys of live memoized instances: the identity, prefixed with
    /// `package/` for package-scoped instances.
    pub fn instance_identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        identities.sort();
        identities
    }

    pub fn generation(&self) -> u64 {
        self.generation
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .number
    }

    pub fn switches(&self) -> &Arc<CapableSwitchManager> {
        &self.switches
    }
}

impl fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginLoader")
            .field("home", &self.home)
            .field("paths", &self.paths)
            .field("generation", &self.generation())
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PluginError;
    use crate::http::exchange::Exchange;
    use crate::plugin::manifest::MANIFEST_FILE_NAME;
    use crate::plugin::{PluginChain, SwitchDescriptor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting;

    #[async_trait]
    impl Plugin for Counting {
        async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
            chain.proceed(exchange).await
        }

        fn exported_switches(&self) -> Vec<SwitchDescriptor> {
            vec![SwitchDescriptor::new("verbose", "log more")]
        }
    }

    fn loader() -> PluginLoader {
        PluginLoader::builtin_only(Arc::new(CapableSwitchManager::new()))
    }

    #[test]
    fn test_resolves_builtin_names() {
        let loader = loader();
        assert_eq!(
            loader.resolve_identity("AddRequestHeader").unwrap(),
            "gateway.builtin.add-request-header"
        );
        assert!(matches!(
            loader.resolve_identity("Nope"),
            Err(PluginError::DefinitionNotFound(_))
        ));
        assert!(matches!(
            loader.instantiate("acme.missing"),
            Err(PluginError::ImplementationNotFound(_))
        ));
    }

    #[test]
    fn test_same_identity_shared_with_distinct_configs() {
        let loader = loader();
        let a = loader
            .resolve(&PluginSpec::new("AddRequestHeader", r#"{"name":"A","value":"1"}"#))
            .unwrap();
        let b = loader
            .resolve(&PluginSpec::new("AddRequestHeader", r#"{"name":"B","value":"2"}"#))
            .unwrap();

        assert!(Arc::ptr_eq(a.plugin(), b.plugin()));
        assert_ne!(a.config(), b.config());
        assert_eq!(loader.instance_identities().len(), 1);
    }

    #[test]
    fn test_concurrent_instantiation_constructs_once() {
        let loader = Arc::new(loader());
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        loader.register("Counting", "test.counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            Arc::new(Counting) as Arc<dyn Plugin>
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let loader = loader.clone();
                std::thread::spawn(move || loader.instantiate("test.counting").unwrap())
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_host_registration_and_exported_switches() {
        let loader = loader();
        loader.register("Counting", "test.counting", || Arc::new(Counting) as Arc<dyn Plugin>);
        assert!(loader.resolve_identity("Counting").is_err());

        loader.reload().unwrap();
        assert_eq!(loader.resolve_identity("Counting").unwrap(), "test.counting");
        loader.instantiate("test.counting").unwrap();

        let group = loader.switches().existing_group("test.counting").unwrap();
        assert_eq!(group.snapshot()[0].name, "verbose");
    }

    #[test]
    fn test_reload_reads_plugin_paths_and_clears_instances() {
        let home = tempfile::tempdir().unwrap();
        let scope = home.path().join("acme");
        std::fs::create_dir(&scope).unwrap();
        std::fs::write(
            scope.join(MANIFEST_FILE_NAME),
            "Greeting=gateway.builtin.static-response\nbad line\n",
        )
        .unwrap();

        let config = PluginsConfig {
            home: home.path().to_path_buf(),
            paths: vec![PathBuf::from("acme"), PathBuf::from("missing")],
            strict: false,
        };
        let loader = PluginLoader::new(&config, Arc::new(CapableSwitchManager::new()));
        loader.reload().unwrap();
        assert_eq!(loader.generation(), 1);
        assert_eq!(
            loader.resolve_identity("Greeting").unwrap(),
            "gateway.builtin.static-response"
        );

        let first = loader.instantiate("gateway.builtin.static-response").unwrap();

        // A package only searches its own plugin path, never the built-ins.
        let mut scoped = PluginSpec::new("Greeting", "{}");
        scoped.package = Some("acme".into());
        assert!(matches!(
            loader.resolve(&scoped),
            Err(PluginError::ImplementationNotFound(_))
        ));
        scoped.package = Some("missing".into());
        assert!(matches!(
            loader.resolve(&scoped),
            Err(PluginError::PackageNotFound(_))
        ));
        assert_eq!(
            loader.instance_identities(),
            vec!["gateway.builtin.static-response"]
        );
        loader.reload().unwrap();
        assert!(loader.instance_identities().is_empty());
        let second = loader.instantiate("gateway.builtin.static-response").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
