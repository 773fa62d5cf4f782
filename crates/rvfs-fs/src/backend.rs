//! The contract every storage backend implements.
//!
//! A backend is split along the same lines as the objects the core hands
//! out:
//!
//! - [`FsLibrary`] -- the loaded module itself: version, description, and the
//!   operations that work on a storage path without a live handle.
//! - [`FsBackend`] -- backend-private state of one open [`Filesystem`].
//! - [`TxnBackend`] -- one open transaction.
//! - [`RootBackend`] -- one revision or transaction tree.
//! - [`HistoryBackend`] -- one step of a node's history walk.
//! - [`NodeIdBackend`] -- one node-revision id.
//!
//! The core never looks inside these objects. It adds identity, routing,
//! and validation, then dispatches.
//!
//! [`Filesystem`]: crate::Filesystem

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use rvfs_types::{
    Checksum, Lock, NodeKind, PathChangeKind, PropMap, Revnum, TextDelta, Version,
};

use crate::context::{CancelFunc, FsContext};
use crate::error::FsResult;
use crate::history::HistoryLocation;
use crate::id::{IdRelation, NodeId};
use crate::init::SharedScope;
use crate::lock::LockRequest;

/// Entry point of a backend module. Receives the loader's version and
/// returns the library's operation table.
pub type LibraryInit = fn(&Version) -> FsResult<Arc<dyn FsLibrary>>;

/// Library-level operations of a backend module.
pub trait FsLibrary: Send + Sync {
    /// The backend's own version. Must equal the loader's exactly.
    fn version(&self) -> Version;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Create new storage at `path`. The directory already exists and
    /// contains only the type marker.
    fn create(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>>;

    /// Open existing storage at `path`.
    fn open(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>>;

    /// Remove the storage at `path`.
    fn delete_fs(&self, path: &Path) -> FsResult<()>;

    /// Copy live storage from `src` to `dest`. `clean` asks the backend to
    /// drop data the copy no longer needs.
    fn hotcopy(&self, src: &Path, dest: &Path, clean: bool) -> FsResult<()>;

    /// Bring storage at `path` back to a consistent state after a crash.
    fn recover(&self, path: &Path, cancel: Option<&CancelFunc>) -> FsResult<()>;

    /// Decode a node id previously produced by [`NodeIdBackend::unparse`].
    fn parse_id(&self, data: &[u8]) -> FsResult<Arc<dyn NodeIdBackend>>;
}

/// Backend state of one open filesystem.
pub trait FsBackend: Send + Sync {
    /// Once-per-process setup, run while the shared initialization gate is
    /// held. Called right after create/open.
    fn serialized_init(&self, scope: &SharedScope) -> FsResult<()>;

    fn youngest_rev(&self) -> FsResult<Revnum>;

    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>>;
    fn revision_proplist(&self, rev: Revnum) -> FsResult<PropMap>;
    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    fn get_uuid(&self) -> FsResult<String>;
    fn set_uuid(&self, uuid: &str) -> FsResult<()>;

    /// Store `rev` in a more compact form. May be a no-op.
    fn deltify(&self, rev: Revnum) -> FsResult<()>;

    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootBackend>>;

    /// Start a transaction on an already validated, concrete base revision.
    fn begin_txn(&self, base: Revnum, flags: TxnFlags) -> FsResult<Box<dyn TxnBackend>>;
    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnBackend>>;
    fn purge_txn(&self, name: &str) -> FsResult<()>;
    fn list_transactions(&self) -> FsResult<Vec<String>>;

    /// Acquire a lock. The request has already passed core validation.
    fn lock(&self, request: &LockRequest) -> FsResult<Lock>;
    fn generate_lock_token(&self) -> FsResult<String>;
    fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> FsResult<()>;
    fn get_lock(&self, path: &str) -> FsResult<Option<Lock>>;

    /// Feed every lock at or below `path` to `receiver` until it breaks.
    fn get_locks(
        &self,
        path: &str,
        receiver: &mut dyn FnMut(&Lock) -> ControlFlow<()>,
    ) -> FsResult<()>;
}

/// Flags accepted by [`FsBackend::begin_txn`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TxnFlags(u32);

impl TxnFlags {
    pub const NONE: Self = Self(0);
    /// Commit fails with `OutOfDate` unless the base is still youngest.
    pub const CHECK_OOD: Self = Self(1);
    /// Commit verifies lock tokens for every changed path.
    pub const CHECK_LOCKS: Self = Self(1 << 1);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TxnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Backend state of one open transaction.
pub trait TxnBackend: Send + Sync {
    fn name(&self) -> &str;
    fn base_revision(&self) -> Revnum;

    /// Merge against the youngest revision and make the result permanent.
    /// Fails with `Conflict` without touching history.
    fn commit(&self) -> FsResult<Revnum>;
    fn abort(&self) -> FsResult<()>;

    fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>>;
    fn proplist(&self) -> FsResult<PropMap>;
    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    fn root(&self) -> FsResult<Box<dyn RootBackend>>;
}

/// One directory entry.
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub id: NodeId,
}

/// One changed path in a revision or transaction.
#[derive(Clone, Debug)]
pub struct PathChange {
    pub node_id: NodeId,
    pub change_kind: PathChangeKind,
    pub text_mod: bool,
    pub prop_mod: bool,
}

/// Tree operations over one root. Paths are canonical (see
/// [`rvfs_types::path::canonicalize`]).
///
/// Mutating methods are only called on transaction roots, and only after
/// the core has validated paths. Operations taking a second root receive one
/// produced by the same backend type.
pub trait RootBackend: Send + Sync {
    /// Lets a backend recover its concrete type from a second root.
    fn as_any(&self) -> &dyn Any;

    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>>;
    fn check_path(&self, path: &str) -> FsResult<NodeKind>;
    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryBackend>>;
    fn node_id(&self, path: &str) -> FsResult<NodeId>;
    /// `None` for a node created in an uncommitted transaction.
    fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>>;
    fn node_created_path(&self, path: &str) -> FsResult<String>;

    fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>>;
    fn node_proplist(&self, path: &str) -> FsResult<PropMap>;
    fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()>;

    fn props_changed(&self, path: &str, other: &dyn RootBackend, other_path: &str)
        -> FsResult<bool>;
    fn contents_changed(
        &self,
        path: &str,
        other: &dyn RootBackend,
        other_path: &str,
    ) -> FsResult<bool>;

    /// Copy source of `path` if `path` is the root of a copy.
    fn copied_from(&self, path: &str) -> FsResult<Option<(Revnum, String)>>;

    /// Three-way merge into `target_path` of this root. Returns the first
    /// conflicting path, leaving this root unchanged, or `None`.
    fn merge(
        &self,
        source: &dyn RootBackend,
        source_path: &str,
        target_path: &str,
        ancestor: &dyn RootBackend,
        ancestor_path: &str,
    ) -> FsResult<Option<String>>;

    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>>;
    fn make_dir(&self, path: &str) -> FsResult<()>;
    fn make_file(&self, path: &str) -> FsResult<()>;
    fn delete_node(&self, path: &str) -> FsResult<()>;

    /// Copy `from_path` of `from` to `to_path` of this root, recording copy
    /// history.
    fn copy(&self, from: &dyn RootBackend, from_path: &str, to_path: &str) -> FsResult<()>;

    /// Link the node at `path` in `from` into this root at the same path,
    /// without copy history.
    fn revision_link(&self, from: &dyn RootBackend, path: &str) -> FsResult<()>;

    fn file_length(&self, path: &str) -> FsResult<u64>;
    fn file_checksum(&self, path: &str) -> FsResult<Checksum>;
    fn file_contents(&self, path: &str) -> FsResult<Bytes>;

    fn apply_textdelta(
        &self,
        path: &str,
        delta: &TextDelta,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()>;
    fn apply_text(
        &self,
        path: &str,
        contents: &[u8],
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()>;

    /// Delta from `source` (or the empty file) to `target_path` of this root.
    fn get_file_delta_stream(
        &self,
        source: Option<(&dyn RootBackend, &str)>,
        target_path: &str,
    ) -> FsResult<TextDelta>;
}

/// One position in a node's history.
pub trait HistoryBackend: Send + Sync {
    fn location(&self) -> HistoryLocation;

    /// The next older interesting location, or `None` when exhausted.
    fn prev(&self, cross_copies: bool) -> FsResult<Option<Box<dyn HistoryBackend>>>;
}

/// A backend's node-revision id.
pub trait NodeIdBackend: Send + Sync + fmt::Debug {
    fn unparse(&self) -> Vec<u8>;

    /// Compare with an id of the same backend type.
    fn compare(&self, other: &dyn NodeIdBackend) -> IdRelation;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txn_flags_combine() {
        let flags = TxnFlags::CHECK_OOD | TxnFlags::CHECK_LOCKS;
        assert!(flags.contains(TxnFlags::CHECK_OOD));
        assert!(flags.contains(TxnFlags::CHECK_LOCKS));
        assert!(!TxnFlags::NONE.contains(TxnFlags::CHECK_OOD));
        assert_eq!(TxnFlags::from_bits(flags.bits()), flags);
    }
}
