//! Node-revision ids and ancestry comparison.

use std::fmt;
use std::sync::Arc;

use crate::backend::{FsLibrary, NodeIdBackend};
use crate::error::FsResult;

/// How two node ids relate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdRelation {
    /// Same node revision.
    Identical,
    /// Different revisions on one line of history.
    Related,
    /// No shared history.
    Unrelated,
}

/// An opaque node-revision id tagged with the backend type that minted it.
#[derive(Clone)]
pub struct NodeId {
    fs_type: Arc<str>,
    inner: Arc<dyn NodeIdBackend>,
}

impl NodeId {
    pub fn new(fs_type: impl Into<Arc<str>>, inner: Arc<dyn NodeIdBackend>) -> Self {
        Self {
            fs_type: fs_type.into(),
            inner,
        }
    }

    /// Parse raw bytes produced by a backend of type `fs_type`.
    pub fn parse(fs_type: &str, library: &dyn FsLibrary, data: &[u8]) -> FsResult<Self> {
        Ok(Self::new(fs_type, library.parse_id(data)?))
    }

    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    pub fn unparse(&self) -> Vec<u8> {
        self.inner.unparse()
    }

    pub fn backend(&self) -> &dyn NodeIdBackend {
        self.inner.as_ref()
    }

    /// Compare two ids. Ids minted by different backend types are always
    /// unrelated.
    pub fn compare(&self, other: &NodeId) -> IdRelation {
        if self.fs_type != other.fs_type {
            return IdRelation::Unrelated;
        }
        self.inner.compare(other.inner.as_ref())
    }

    /// True unless the two ids are unrelated.
    pub fn check_related(&self, other: &NodeId) -> bool {
        self.compare(other) != IdRelation::Unrelated
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == IdRelation::Identical
    }
}

impl Eq for NodeId {}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.unparse()))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}:{})", self.fs_type, self)
    }
}
