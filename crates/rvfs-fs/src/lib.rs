//! Backend-agnostic core of RVFS, the revisioned tree filesystem.
//!
//! RVFS stores the whole history of a directory tree as immutable, numbered
//! revisions. Changes are staged in named transactions and become a new
//! revision on commit. This crate holds no storage logic of its own: it
//! selects a backend, validates what callers ask for, enforces lifecycle
//! rules, and dispatches to the backend.
//!
//! # Key Types
//!
//! - [`Registry`] -- maps backend type names to loaded, version-checked
//!   backends
//! - [`Filesystem`] -- an open filesystem bound to one storage path
//! - [`Transaction`] -- a mutable staging area on top of a base revision
//! - [`Root`] -- a view over one revision (read-only) or one transaction
//! - [`NodeId`] -- an opaque lineage token with three-way comparison
//! - [`History`] -- a lazy backward walk over a node's past locations
//! - [`LockRequest`] -- a path lock acquisition, validated before dispatch
//!
//! # Backends
//!
//! A backend implements the traits in [`backend`] and is made known to a
//! registry through a [`BackendDescriptor`]. Backends that need state shared
//! by every handle in the process obtain it through the [`init`] gate.
//!
//! # Design Rules
//!
//! 1. Revision roots never reach a backend's mutating methods.
//! 2. Paths that are about to be created are validated before dispatch.
//! 3. Lock comments and expirations are validated before dispatch.
//! 4. Backend errors pass through unchanged.

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod history;
pub mod id;
pub mod info;
pub mod init;
pub mod lock;
pub mod registry;
pub mod root;
pub mod txn;
pub mod warning;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{
    DirEntry, FsBackend, FsLibrary, HistoryBackend, LibraryInit, NodeIdBackend, PathChange,
    RootBackend, TxnBackend, TxnFlags,
};
pub use config::{FsConfig, CONFIG_FS_TYPE};
pub use context::{CancelFunc, FsAccess, FsContext};
pub use error::{FsError, FsResult};
pub use fs::{delete_fs, hotcopy, recover, Filesystem};
pub use history::{collect_locations, History, HistoryLocation};
pub use id::{IdRelation, NodeId};
pub use info::{path_info, Depth, PathInfo};
pub use init::SharedScope;
pub use lock::LockRequest;
pub use registry::{
    BackendDescriptor, ModuleInfo, ModuleLoader, NoDynamicLoading, Registry, DEFAULT_FS_TYPE,
    LEGACY_FS_TYPE, TYPE_MARKER_FILE,
};
pub use root::{Root, RootKind};
pub use txn::Transaction;
pub use warning::{AbortOnWarning, LogWarnings, WarningHandler};

pub use rvfs_types;
