//! Roots: fixed views over one revision or one transaction.
//!
//! Every tree, content, and node-property operation goes through a [`Root`].
//! Both kinds expose the same methods; only transaction roots accept
//! mutations. The read-only check lives here rather than in each backend,
//! and so does path validation for anything that creates a new entry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use rvfs_types::{path, Checksum, NodeKind, PropMap, Revnum, TextDelta};
use tracing::debug;

use crate::backend::{DirEntry, PathChange, RootBackend};
use crate::error::{FsError, FsResult};
use crate::history::History;
use crate::id::NodeId;

/// Which tree a root looks at.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RootKind {
    /// An immutable committed revision.
    Revision(Revnum),
    /// An open transaction, by name.
    Transaction(String),
}

/// A view over one revision or one transaction.
pub struct Root {
    kind: RootKind,
    fs_type: Arc<str>,
    backend: Box<dyn RootBackend>,
}

impl Root {
    pub(crate) fn new(kind: RootKind, fs_type: Arc<str>, backend: Box<dyn RootBackend>) -> Self {
        Self {
            kind,
            fs_type,
            backend,
        }
    }

    pub fn kind(&self) -> &RootKind {
        &self.kind
    }

    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    pub fn is_revision_root(&self) -> bool {
        matches!(self.kind, RootKind::Revision(_))
    }

    pub fn is_txn_root(&self) -> bool {
        matches!(self.kind, RootKind::Transaction(_))
    }

    /// The revision of a revision root.
    pub fn revision(&self) -> Option<Revnum> {
        match self.kind {
            RootKind::Revision(rev) => Some(rev),
            RootKind::Transaction(_) => None,
        }
    }

    /// The transaction name of a transaction root.
    pub fn txn_name(&self) -> Option<&str> {
        match &self.kind {
            RootKind::Transaction(name) => Some(name),
            RootKind::Revision(_) => None,
        }
    }

    pub fn backend(&self) -> &dyn RootBackend {
        self.backend.as_ref()
    }

    fn ensure_mutable(&self, operation: &'static str) -> FsResult<()> {
        match self.kind {
            RootKind::Transaction(_) => Ok(()),
            RootKind::Revision(_) => Err(FsError::ReadOnlyRoot { operation }),
        }
    }

    fn ensure_revision(&self, operation: &'static str) -> FsResult<()> {
        match self.kind {
            RootKind::Revision(_) => Ok(()),
            RootKind::Transaction(_) => Err(FsError::NotRevisionRoot { operation }),
        }
    }

    fn ensure_same_type(&self, other: &Root) -> FsResult<()> {
        if self.fs_type != other.fs_type {
            return Err(FsError::InvalidParameter(format!(
                "roots belong to different FS types ('{}' and '{}')",
                self.fs_type, other.fs_type
            )));
        }
        Ok(())
    }

    /// Validate a path that is about to be created and return its canonical
    /// form.
    fn creatable(raw: &str) -> FsResult<String> {
        path::check_valid(raw)?;
        let canonical = path::canonicalize(raw);
        if path::is_root(&canonical) {
            return Err(FsError::AlreadyExists(canonical));
        }
        Ok(canonical)
    }

    // ------------------------------------------------------------------
    // Tree queries
    // ------------------------------------------------------------------

    /// Every path changed in this root relative to its base.
    pub fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        self.backend.paths_changed()
    }

    pub fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        self.backend.check_path(&path::canonicalize(path))
    }

    pub fn is_dir(&self, path: &str) -> FsResult<bool> {
        Ok(self.check_path(path)? == NodeKind::Dir)
    }

    pub fn is_file(&self, path: &str) -> FsResult<bool> {
        Ok(self.check_path(path)? == NodeKind::File)
    }

    pub fn node_id(&self, path: &str) -> FsResult<NodeId> {
        self.backend.node_id(&path::canonicalize(path))
    }

    /// Revision in which the node at `path` was last created or changed.
    /// `None` for a node changed in this (uncommitted) transaction.
    pub fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>> {
        self.backend.node_created_rev(&path::canonicalize(path))
    }

    pub fn node_created_path(&self, path: &str) -> FsResult<String> {
        self.backend.node_created_path(&path::canonicalize(path))
    }

    pub fn copied_from(&self, path: &str) -> FsResult<Option<(Revnum, String)>> {
        self.backend.copied_from(&path::canonicalize(path))
    }

    pub fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        self.backend.dir_entries(&path::canonicalize(path))
    }

    /// History of the node at `path`, starting at this root's revision.
    pub fn node_history(&self, path: &str) -> FsResult<History> {
        self.ensure_revision("node history")?;
        let backend = self.backend.node_history(&path::canonicalize(path))?;
        Ok(History::new(backend))
    }

    // ------------------------------------------------------------------
    // Node properties
    // ------------------------------------------------------------------

    pub fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.backend.node_prop(&path::canonicalize(path), name)
    }

    pub fn node_proplist(&self, path: &str) -> FsResult<PropMap> {
        self.backend.node_proplist(&path::canonicalize(path))
    }

    pub fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.ensure_mutable("change a node property")?;
        self.backend
            .change_node_prop(&path::canonicalize(path), name, value)
    }

    /// Whether the properties of `path` here differ from `other_path` in
    /// `other`.
    pub fn props_changed(&self, path: &str, other: &Root, other_path: &str) -> FsResult<bool> {
        self.ensure_same_type(other)?;
        self.backend.props_changed(
            &path::canonicalize(path),
            other.backend(),
            &path::canonicalize(other_path),
        )
    }

    /// Whether the contents of `path` here differ from `other_path` in
    /// `other`. May report a change for identical bytes stored separately.
    pub fn contents_changed(&self, path: &str, other: &Root, other_path: &str) -> FsResult<bool> {
        self.ensure_same_type(other)?;
        self.backend.contents_changed(
            &path::canonicalize(path),
            other.backend(),
            &path::canonicalize(other_path),
        )
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    pub fn make_dir(&self, path: &str) -> FsResult<()> {
        self.ensure_mutable("make a directory")?;
        let path = Self::creatable(path)?;
        self.backend.make_dir(&path)
    }

    pub fn make_file(&self, path: &str) -> FsResult<()> {
        self.ensure_mutable("make a file")?;
        let path = Self::creatable(path)?;
        self.backend.make_file(&path)
    }

    pub fn delete(&self, path: &str) -> FsResult<()> {
        self.ensure_mutable("delete a node")?;
        let path = path::canonicalize(path);
        if path::is_root(&path) {
            return Err(FsError::InvalidParameter("the root directory cannot be deleted".into()));
        }
        self.backend.delete_node(&path)
    }

    /// Copy `from_path` of the revision root `from` to `to_path` here,
    /// recording copy history.
    pub fn copy(&self, from: &Root, from_path: &str, to_path: &str) -> FsResult<()> {
        self.ensure_mutable("copy")?;
        let to_path = Self::creatable(to_path)?;
        from.ensure_revision("copy source")?;
        self.ensure_same_type(from)?;
        let from_path = path::canonicalize(from_path);
        debug!(from = %from_path, to = %to_path, "copying node");
        self.backend.copy(from.backend(), &from_path, &to_path)
    }

    /// Bring the node at `path` in the revision root `from` into this
    /// transaction without recording copy history.
    pub fn revision_link(&self, from: &Root, path: &str) -> FsResult<()> {
        self.ensure_mutable("link a node")?;
        from.ensure_revision("link source")?;
        self.ensure_same_type(from)?;
        self.backend.revision_link(from.backend(), &path::canonicalize(path))
    }

    /// Three-way merge of `source_path` in `source` into `target_path`
    /// here, relative to `ancestor_path` in `ancestor`.
    ///
    /// Returns the first conflicting path, or `None` if the merge was clean.
    /// A conflicting merge leaves this root untouched.
    pub fn merge(
        &self,
        source: &Root,
        source_path: &str,
        target_path: &str,
        ancestor: &Root,
        ancestor_path: &str,
    ) -> FsResult<Option<String>> {
        self.ensure_mutable("merge")?;
        self.ensure_same_type(source)?;
        self.ensure_same_type(ancestor)?;
        self.backend.merge(
            source.backend(),
            &path::canonicalize(source_path),
            &path::canonicalize(target_path),
            ancestor.backend(),
            &path::canonicalize(ancestor_path),
        )
    }

    // ------------------------------------------------------------------
    // File contents
    // ------------------------------------------------------------------

    pub fn file_length(&self, path: &str) -> FsResult<u64> {
        self.backend.file_length(&path::canonicalize(path))
    }

    pub fn file_checksum(&self, path: &str) -> FsResult<Checksum> {
        self.backend.file_checksum(&path::canonicalize(path))
    }

    pub fn file_contents(&self, path: &str) -> FsResult<Bytes> {
        self.backend.file_contents(&path::canonicalize(path))
    }

    /// Apply `delta` to the current contents of `path`. When given, the
    /// checksums are verified before and after.
    pub fn apply_textdelta(
        &self,
        path: &str,
        delta: &TextDelta,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        self.ensure_mutable("apply a text delta")?;
        self.backend.apply_textdelta(
            &path::canonicalize(path),
            delta,
            base_checksum,
            result_checksum,
        )
    }

    /// Replace the contents of `path`.
    pub fn apply_text(
        &self,
        path: &str,
        contents: &[u8],
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        self.ensure_mutable("apply text")?;
        self.backend
            .apply_text(&path::canonicalize(path), contents, result_checksum)
    }

    /// Delta turning `source` (or an empty file) into `target_path` here.
    pub fn get_file_delta_stream(
        &self,
        source: Option<(&Root, &str)>,
        target_path: &str,
    ) -> FsResult<TextDelta> {
        let source = match source {
            Some((root, path)) => {
                self.ensure_same_type(root)?;
                Some((root.backend(), path::canonicalize(path)))
            }
            None => None,
        };
        self.backend.get_file_delta_stream(
            source.as_ref().map(|(root, path)| (*root, path.as_str())),
            &path::canonicalize(target_path),
        )
    }
}

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Root")
            .field("kind", &self.kind)
            .field("fs_type", &self.fs_type)
            .finish_non_exhaustive()
    }
}
