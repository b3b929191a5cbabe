//! Shared-library plugin boundary.
//!
//! A plugin library is a `cdylib` built against this crate that exports two
//! symbols, usually through [`export_plugins!`](crate::export_plugins):
//!
//! ```text
//! gateway_plugin_api_version() -> u32
//! gateway_plugin_create(identity: *const c_char) -> *mut Box<dyn Plugin>
//! ```
//!
//! `gateway_plugin_create` returns null for identities the library does not
//! provide. Libraries must be built with the same compiler and crate version
//! as the gateway: trait objects cross the boundary as-is.

use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::ffi::CString;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PluginError;
use crate::http::exchange::Exchange;
use crate::plugin::{Plugin, PluginChain, SwitchDescriptor};

/// Version of the plugin boundary. Bumped on any incompatible change.
pub const PLUGIN_API_VERSION: u32 = 1;

pub const API_VERSION_SYMBOL: &[u8] = b"gateway_plugin_api_version";
pub const CREATE_SYMBOL: &[u8] = b"gateway_plugin_create";

type ApiVersionFn = unsafe extern "C" fn() -> u32;
type CreateFn = unsafe extern "C" fn(*const c_char) -> *mut Box<dyn Plugin>;

/// Export plugin constructors from a `cdylib`.
///
/// ```ignore
/// api_gateway::export_plugins! {
///     "acme.rate-guard" => RateGuard::default(),
/// }
/// ```
#[macro_export]
macro_rules! export_plugins {
    ($($identity:literal => $ctor:expr),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn gateway_plugin_api_version() -> u32 {
            $crate::plugin::abi::PLUGIN_API_VERSION
        }

        /// # Safety
        /// `identity` must be null or a valid NUL-terminated string.
        #[no_mangle]
        pub unsafe extern "C" fn gateway_plugin_create(
            identity: *const ::std::os::raw::c_char,
        ) -> *mut ::std::boxed::Box<dyn $crate::plugin::Plugin> {
            if identity.is_null() {
                return ::std::ptr::null_mut();
            }
            let identity = match unsafe { ::std::ffi::CStr::from_ptr(identity) }.to_str() {
                Ok(identity) => identity,
                Err(_) => return ::std::ptr::null_mut(),
            };
            $(
                if identity == $identity {
                    let plugin: ::std::boxed::Box<dyn $crate::plugin::Plugin> =
                        ::std::boxed::Box::new($ctor);
                    return ::std::boxed::Box::into_raw(::std::boxed::Box::new(plugin));
                }
            )+
            ::std::ptr::null_mut()
        }
    };
}

/// An opened plugin library with a verified API version.
#[derive(Debug)]
pub struct PluginLibrary {
    path: PathBuf,
    library: Arc<Library>,
}

impl PluginLibrary {
    /// Open `path` and check its API version.
    pub fn open(path: &Path) -> Result<Self, PluginError> {
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::LibraryLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let actual = unsafe {
            let version: Symbol<ApiVersionFn> =
                library
                    .get(API_VERSION_SYMBOL)
                    .map_err(|e| PluginError::LibraryLoad {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })?;
            version()
        };
        if actual != PLUGIN_API_VERSION {
            return Err(PluginError::VersionMismatch {
                path: path.to_path_buf(),
                expected: PLUGIN_API_VERSION,
                actual,
            });
        }

        tracing::info!(path = %path.display(), "Loaded plugin library");
        Ok(Self {
            path: path.to_path_buf(),
            library: Arc::new(library),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Construct `identity` if this library provides it.
    pub fn create(&self, identity: &str) -> Result<Option<Box<dyn Plugin>>, PluginError> {
        let c_identity = CString::new(identity).map_err(|e| PluginError::LibraryLoad {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let raw = unsafe {
            let create: Symbol<CreateFn> =
                self.library
                    .get(CREATE_SYMBOL)
                    .map_err(|e| PluginError::LibraryLoad {
                        path: self.path.clone(),
                        reason: e.to_string(),
                    })?;
            create(c_identity.as_ptr())
        };
        if raw.is_null() {
            return Ok(None);
        }

        let plugin = unsafe { *Box::from_raw(raw) };
        Ok(Some(Box::new(LibraryPlugin {
            plugin,
            _library: self.library.clone(),
        })))
    }
}

/// Keeps the library mapped while the plugin is alive.
///
/// Field order matters: the plugin is dropped before the library handle.
struct LibraryPlugin {
    plugin: Box<dyn Plugin>,
    _library: Arc<Library>,
}

#[async_trait]
impl Plugin for LibraryPlugin {
    async fn handle(&self, exchange: &mut Exchange, chain: PluginChain<'_>) -> Result<(), PluginError> {
        self.plugin.handle(exchange, chain).await
    }

    fn exported_switches(&self) -> Vec<SwitchDescriptor> {
        self.plugin.exported_switches()
    }
}

/// Shared library files in `dir`, sorted by name.
pub fn libraries_in(dir: &Path) -> Result<Vec<PathBuf>, PluginError> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_library = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION);
        if is_library && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir
            .path()
            .join(format!("fake.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&fake, b"not a library").unwrap();

        let err = PluginLibrary::open(&fake).unwrap_err();
        assert!(matches!(err, PluginError::LibraryLoad { .. }));
    }

    #[test]
    fn test_libraries_in_filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir
            .path()
            .join(format!("a.{}", std::env::consts::DLL_EXTENSION));
        std::fs::write(&lib, b"").unwrap();
        std::fs::write(dir.path().join("gateway-plugin.def"), b"").unwrap();

        assert_eq!(libraries_in(dir.path()).unwrap(), vec![lib]);
    }
}
