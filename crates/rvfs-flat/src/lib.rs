//! Flat-file reference backend for RVFS.
//!
//! Every committed revision is one immutable, CRC-framed file holding the
//! node-revisions that revision created and the paths it changed.
//! Unchanged subtrees are shared by id with older revisions. Transactions
//! are one mutable file each, and the lock table is a single JSON document.
//!
//! # On-disk layout
//!
//! ```text
//! <repo>/
//!   fs-type          type marker, written by the core
//!   format           layout version
//!   uuid
//!   current          "<youngest> <next-node> <next-copy>"
//!   txn-current      transaction name counter
//!   locks.json
//!   revs/<N>         revision files
//!   revprops/<N>     revision properties (JSON)
//!   txns/<name>.txn  open transactions
//! ```
//!
//! # Key Types
//!
//! - [`FlatLibrary`] -- the module entry returned by [`init`]
//! - [`FlatFs`] -- one open handle
//! - [`FlatId`] -- `node.copy.origin` node-revision ids
//!
//! # Design Rules
//!
//! 1. A revision exists once `current` names it. Everything it needs is
//!    written before `current` is replaced.
//! 2. Every handle on one path in a process shares one [`Repo`] through the
//!    core's initialization gate, so commits serialize on one lock.
//! 3. A failed edit or a conflicting commit leaves the transaction file as
//!    it was.
//!
//! [`Repo`]: repo::Repo

pub mod error;
pub mod fs;
pub mod history;
pub mod id;
pub mod layout;
pub mod library;
pub mod locks;
pub mod merge;
pub mod noderev;
pub mod repo;
pub mod revfile;
pub mod root;
pub mod staging;
pub mod tree;
pub mod txn;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use rvfs_fs::{BackendDescriptor, FsError, FsLibrary, FsResult};
use rvfs_types::Version;
use tracing::debug;

pub use error::{FlatError, FlatResult};
pub use fs::FlatFs;
pub use id::FlatId;
pub use library::FlatLibrary;

/// Type name written to the type marker.
pub const FS_TYPE: &str = "flat";

/// Module name used for library and symbol names.
pub const MODULE_NAME: &str = "fs";

/// Config key: fsync every file the backend replaces. Defaults to off.
pub const CONFIG_FSYNC: &str = "flat.fsync";

/// The version this backend was built as.
pub fn version() -> Version {
    rvfs_types::crate_version!()
}

/// Module entry point. Refuses loaders this build cannot serve.
pub fn init(loader: &Version) -> FsResult<Arc<dyn FsLibrary>> {
    let ours = version();
    if !ours.is_compatible(loader) {
        return Err(FsError::VersionMismatch {
            fs_type: FS_TYPE.to_string(),
            expected: *loader,
            found: ours,
        });
    }
    debug!(version = %ours, loader = %loader, "initialized flat backend");
    Ok(Arc::new(FlatLibrary::new(ours)))
}

/// Descriptor for linking this backend into a registry.
pub fn descriptor() -> BackendDescriptor {
    BackendDescriptor::linked(FS_TYPE, MODULE_NAME, init)
}
