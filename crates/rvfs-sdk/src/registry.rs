//! The process-wide default registry.

use std::sync::OnceLock;

use rvfs_fs::{BackendDescriptor, FsResult, Registry, LEGACY_FS_TYPE};
use rvfs_types::Version;
use tracing::debug;

static DEFAULT: OnceLock<Registry> = OnceLock::new();

/// Module name of the legacy backend, reachable only through a dynamic
/// loader.
pub const LEGACY_MODULE_NAME: &str = "base";

/// The version every backend in the default registry must report.
pub fn version() -> Version {
    rvfs_types::crate_version!()
}

/// Build a registry holding the compiled-in backends.
pub fn build() -> FsResult<Registry> {
    Registry::new(version())
        .with(rvfs_flat::descriptor())?
        .with(BackendDescriptor::dynamic(LEGACY_FS_TYPE, LEGACY_MODULE_NAME))
}

/// The shared default registry, built on first use.
pub fn default_registry() -> FsResult<&'static Registry> {
    if let Some(registry) = DEFAULT.get() {
        return Ok(registry);
    }
    let built = build()?;
    debug!(version = %built.version(), backends = built.descriptors().len(), "built default registry");
    Ok(DEFAULT.get_or_init(|| built))
}
