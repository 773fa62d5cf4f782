//! Backend registry: maps a type name to a loaded, version-checked backend.
//!
//! A [`Registry`] owns a table of [`BackendDescriptor`]s. A descriptor either
//! carries a compiled-in entry point or names a module that a
//! [`ModuleLoader`] can locate at runtime. Resolution results are cached, so
//! every handle of a given type shares one library object.
//!
//! Storage created through the registry is tagged with a one-line
//! [`TYPE_MARKER_FILE`] so it can later be reopened without the caller
//! knowing its type.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use rvfs_types::Version;
use tracing::{debug, info};

use crate::backend::{FsLibrary, LibraryInit};
use crate::error::{FsError, FsResult};
use crate::id::NodeId;

/// Backend type used by `create` when the config names none.
pub const DEFAULT_FS_TYPE: &str = "flat";

/// Backend type assumed for storage that carries no type marker.
pub const LEGACY_FS_TYPE: &str = "tree";

/// File inside a storage directory holding the backend type name.
pub const TYPE_MARKER_FILE: &str = "fs-type";

/// Static description of one backend.
#[derive(Clone, Copy)]
pub struct BackendDescriptor {
    /// Name stored in the type marker, e.g. `"flat"`.
    pub fs_type: &'static str,
    /// Module name used to derive the dynamic library and symbol names.
    pub module_name: &'static str,
    /// Compiled-in entry point, if the backend is linked statically.
    pub init: Option<LibraryInit>,
}

impl BackendDescriptor {
    pub const fn linked(fs_type: &'static str, module_name: &'static str, init: LibraryInit) -> Self {
        Self {
            fs_type,
            module_name,
            init: Some(init),
        }
    }

    pub const fn dynamic(fs_type: &'static str, module_name: &'static str) -> Self {
        Self {
            fs_type,
            module_name,
            init: None,
        }
    }

    /// Library file a dynamic loader looks for.
    pub fn library_name(&self, version: &Version) -> String {
        format!("librvfs_fs_{}-{}.so.0", self.module_name, version.major)
    }

    /// Entry symbol inside that library.
    pub fn symbol_name(&self) -> String {
        format!("rvfs_fs_{}_init", self.module_name)
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("fs_type", &self.fs_type)
            .field("module_name", &self.module_name)
            .field("linked", &self.init.is_some())
            .finish()
    }
}

/// Extension point for locating backends that are not compiled in.
pub trait ModuleLoader: Send + Sync {
    /// Find `symbol` in `library`.
    ///
    /// Returns `Ok(None)` if the library cannot be found at all; the registry
    /// reports that as an unknown type. A library that is found but lacks
    /// the symbol is an error ([`FsError::ModuleLoadFailure`]).
    fn load(&self, library: &str, symbol: &str) -> FsResult<Option<LibraryInit>>;
}

/// Loader for builds without runtime module loading: nothing is ever found.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDynamicLoading;

impl ModuleLoader for NoDynamicLoading {
    fn load(&self, _library: &str, _symbol: &str) -> FsResult<Option<LibraryInit>> {
        Ok(None)
    }
}

/// One resolvable backend, as reported by [`Registry::list_available`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleInfo {
    pub fs_type: String,
    pub module_name: String,
    pub description: String,
}

/// Table of known backends plus a cache of resolved libraries.
pub struct Registry {
    descriptors: Vec<BackendDescriptor>,
    loader: Box<dyn ModuleLoader>,
    version: Version,
    resolved: Mutex<HashMap<String, Arc<dyn FsLibrary>>>,
}

impl Registry {
    /// An empty registry checking backends against `version`.
    pub fn new(version: Version) -> Self {
        Self {
            descriptors: Vec::new(),
            loader: Box::new(NoDynamicLoading),
            version,
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_loader(mut self, loader: Box<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Add a descriptor. Type names must be unique.
    pub fn register(&mut self, descriptor: BackendDescriptor) -> FsResult<()> {
        if self.descriptor(descriptor.fs_type).is_some() {
            return Err(FsError::InvalidParameter(format!(
                "FS type '{}' is already registered",
                descriptor.fs_type
            )));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, descriptor: BackendDescriptor) -> FsResult<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn descriptors(&self) -> &[BackendDescriptor] {
        &self.descriptors
    }

    fn descriptor(&self, fs_type: &str) -> Option<&BackendDescriptor> {
        self.descriptors.iter().find(|d| d.fs_type == fs_type)
    }

    /// Resolve `fs_type` to its library, loading it on first use.
    pub fn resolve(&self, fs_type: &str) -> FsResult<Arc<dyn FsLibrary>> {
        if let Some(library) = self.cached(fs_type) {
            return Ok(library);
        }

        let descriptor = self
            .descriptor(fs_type)
            .ok_or_else(|| FsError::UnknownBackendType {
                fs_type: fs_type.to_string(),
                reason: "no such backend is registered".into(),
            })?;
        let init = self.entry_point(descriptor)?;
        let library = init(&self.version)?;

        let found = library.version();
        if found != self.version {
            return Err(FsError::VersionMismatch {
                fs_type: fs_type.to_string(),
                expected: self.version,
                found,
            });
        }

        // The entry point ran unlocked; another thread may have won the race.
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = resolved.get(fs_type) {
            return Ok(Arc::clone(existing));
        }
        debug!(fs_type, version = %found, "resolved FS backend");
        resolved.insert(fs_type.to_string(), Arc::clone(&library));
        Ok(library)
    }

    fn cached(&self, fs_type: &str) -> Option<Arc<dyn FsLibrary>> {
        let resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        resolved.get(fs_type).map(Arc::clone)
    }

    fn entry_point(&self, descriptor: &BackendDescriptor) -> FsResult<LibraryInit> {
        if let Some(init) = descriptor.init {
            return Ok(init);
        }
        let library = descriptor.library_name(&self.version);
        let symbol = descriptor.symbol_name();
        match self.loader.load(&library, &symbol)? {
            Some(init) => Ok(init),
            None => Err(FsError::UnknownBackendType {
                fs_type: descriptor.fs_type.to_string(),
                reason: format!("failed to load module '{library}'"),
            }),
        }
    }

    /// Resolve the backend that owns the storage at `path`.
    pub fn resolve_for_existing_storage(
        &self,
        path: &Path,
    ) -> FsResult<(String, Arc<dyn FsLibrary>)> {
        let fs_type = read_type_marker(path)?;
        let library = self.resolve(&fs_type)?;
        Ok((fs_type, library))
    }

    /// Every backend that resolves, in registration order.
    ///
    /// Types that fail as unknown (typically a dynamic module that is not
    /// installed) are skipped; any other failure is returned.
    pub fn list_available(&self) -> FsResult<Vec<ModuleInfo>> {
        let mut modules = Vec::new();
        for descriptor in &self.descriptors {
            match self.resolve(descriptor.fs_type) {
                Ok(library) => modules.push(ModuleInfo {
                    fs_type: descriptor.fs_type.to_string(),
                    module_name: descriptor.module_name.to_string(),
                    description: library.description().to_string(),
                }),
                Err(FsError::UnknownBackendType { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(modules)
    }

    /// One `* fs_<module> : <description>` line per available backend.
    pub fn print_modules(&self) -> FsResult<String> {
        let out = self
            .list_available()?
            .iter()
            .map(|module| format!("* fs_{} : {}\n", module.module_name, module.description))
            .collect();
        Ok(out)
    }

    /// Parse a raw node id produced by a backend of type `fs_type`.
    pub fn parse_id(&self, fs_type: &str, data: &[u8]) -> FsResult<NodeId> {
        let library = self.resolve(fs_type)?;
        NodeId::parse(fs_type, library.as_ref(), data)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Read the backend type recorded in `path`, or [`LEGACY_FS_TYPE`] if the
/// storage predates type markers.
pub fn read_type_marker(path: &Path) -> FsResult<String> {
    match fs::read_to_string(path.join(TYPE_MARKER_FILE)) {
        Ok(text) => {
            let fs_type = text.lines().next().unwrap_or("").trim();
            if fs_type.is_empty() {
                return Err(FsError::Corrupt(format!(
                    "empty type marker in '{}'",
                    path.display()
                )));
            }
            Ok(fs_type.to_string())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LEGACY_FS_TYPE.to_string()),
        Err(e) => Err(e.into()),
    }
}

pub fn write_type_marker(path: &Path, fs_type: &str) -> FsResult<()> {
    fs::write(path.join(TYPE_MARKER_FILE), format!("{fs_type}\n"))?;
    info!(path = %path.display(), fs_type, "wrote FS type marker");
    Ok(())
}
