//! Entry point for applications embedding RVFS.
//!
//! Wires the compiled-in backends into one process-wide [`Registry`] and
//! offers the path-level operations (create, open, delete, hotcopy,
//! recover) against it. Everything past opening a handle is the core API,
//! re-exported here.
//!
//! ```no_run
//! use rvfs_sdk::{FsConfig, RevisionSpec, TxnFlags};
//!
//! # fn main() -> rvfs_sdk::FsResult<()> {
//! let fs = rvfs_sdk::create("/srv/repo".as_ref(), FsConfig::new())?;
//! let txn = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE)?;
//! txn.root()?.make_file("/README")?;
//! let rev = txn.commit()?;
//! # let _ = rev;
//! # Ok(())
//! # }
//! ```
//!
//! [`Registry`]: rvfs_fs::Registry

pub mod registry;
pub mod repository;

pub use registry::{build as build_registry, default_registry, version};
pub use repository::{
    create, delete_fs, fs_type, hotcopy, list_modules, load_config, open, parse_id,
    print_modules, recover,
};

// Re-export key types
pub use rvfs_fs::{
    collect_locations, path_info, Depth, Filesystem, FsAccess, FsConfig, FsError, FsResult,
    History, HistoryLocation, LockRequest, LogWarnings, NodeId, PathInfo, Root, Transaction,
    TxnFlags, WarningHandler,
};
pub use rvfs_types::{Checksum, Lock, NodeKind, PathChangeKind, RevisionSpec, Revnum, TextDelta};

/// Set up the shared initialization gate. Optional: the first open does it
/// on demand.
pub fn initialize() {
    rvfs_fs::init::initialize();
}
