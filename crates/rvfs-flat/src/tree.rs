//! Read access to a tree of node-revisions, committed or staged.

use rvfs_fs::{FsError, FsResult};
use rvfs_types::path;

use crate::id::FlatId;
use crate::noderev::NodeRev;
use crate::repo::Repo;
use crate::revfile::RevisionFile;
use crate::staging::TxnState;

/// A tree whose nodes can be fetched by id.
pub trait NodeStore {
    fn root_id(&self) -> &FlatId;
    fn node(&self, id: &FlatId) -> FsResult<NodeRev>;
}

/// The tree of one committed revision.
pub struct RevStore<'a> {
    pub repo: &'a Repo,
    pub file: &'a RevisionFile,
}

impl NodeStore for RevStore<'_> {
    fn root_id(&self) -> &FlatId {
        &self.file.root
    }

    fn node(&self, id: &FlatId) -> FsResult<NodeRev> {
        if id.rev() == Some(self.file.rev) {
            if let Some(node) = self.file.nodes.get(&id.key()) {
                return Ok(node.clone());
            }
        }
        self.repo.node(id)
    }
}

/// The tree of one transaction.
pub struct TxnStore<'a> {
    pub repo: &'a Repo,
    pub state: &'a TxnState,
}

impl NodeStore for TxnStore<'_> {
    fn root_id(&self) -> &FlatId {
        &self.state.root
    }

    fn node(&self, id: &FlatId) -> FsResult<NodeRev> {
        self.state.node(self.repo, id)
    }
}

/// The node at `path`, or `None` if any component is missing or a file.
pub fn lookup(store: &dyn NodeStore, path: &str) -> FsResult<Option<NodeRev>> {
    let mut node = store.node(store.root_id())?;
    for name in path::components(path) {
        let Some(id) = node.entries().and_then(|entries| entries.get(name)).cloned() else {
            return Ok(None);
        };
        node = store.node(&id)?;
    }
    Ok(Some(node))
}

pub fn get(store: &dyn NodeStore, path: &str) -> FsResult<NodeRev> {
    lookup(store, path)?.ok_or_else(|| FsError::NotFound(path.to_string()))
}

pub fn get_file(store: &dyn NodeStore, path: &str) -> FsResult<NodeRev> {
    let node = get(store, path)?;
    if node.contents().is_none() {
        return Err(FsError::NotFile(path.to_string()));
    }
    Ok(node)
}

pub fn get_dir(store: &dyn NodeStore, path: &str) -> FsResult<NodeRev> {
    let node = get(store, path)?;
    if node.entries().is_none() {
        return Err(FsError::NotDirectory(path.to_string()));
    }
    Ok(node)
}
