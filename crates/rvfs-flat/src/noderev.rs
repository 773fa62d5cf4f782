//! Node-revisions: one version of one file or directory.

use std::collections::BTreeMap;

use rvfs_types::{NodeKind, PathChangeKind, PropMap, Revnum};
use serde::{Deserialize, Serialize};

use crate::id::FlatId;

/// Where a copied node came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyFrom {
    pub rev: Revnum,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    File { contents: Vec<u8> },
    Dir { entries: BTreeMap<String, FlatId> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRev {
    pub id: FlatId,
    /// The node-revision this one was derived from.
    pub predecessor: Option<FlatId>,
    /// Path the node had when this node-revision was created.
    pub created_path: String,
    /// Set on every node created by a copy, including descendants of the
    /// copied directory.
    pub copyfrom: Option<CopyFrom>,
    /// Set only on the node the copy was requested for.
    pub is_copy_root: bool,
    pub props: PropMap,
    pub data: NodeData,
}

impl NodeRev {
    pub fn new_dir(id: FlatId, created_path: impl Into<String>) -> Self {
        Self::fresh(id, created_path, NodeData::Dir {
            entries: BTreeMap::new(),
        })
    }

    pub fn new_file(id: FlatId, created_path: impl Into<String>) -> Self {
        Self::fresh(id, created_path, NodeData::File {
            contents: Vec::new(),
        })
    }

    fn fresh(id: FlatId, created_path: impl Into<String>, data: NodeData) -> Self {
        Self {
            id,
            predecessor: None,
            created_path: created_path.into(),
            copyfrom: None,
            is_copy_root: false,
            props: PropMap::new(),
            data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::File { .. } => NodeKind::File,
            NodeData::Dir { .. } => NodeKind::Dir,
        }
    }

    pub fn entries(&self) -> Option<&BTreeMap<String, FlatId>> {
        match &self.data {
            NodeData::Dir { entries } => Some(entries),
            NodeData::File { .. } => None,
        }
    }

    pub fn entries_mut(&mut self) -> Option<&mut BTreeMap<String, FlatId>> {
        match &mut self.data {
            NodeData::Dir { entries } => Some(entries),
            NodeData::File { .. } => None,
        }
    }

    pub fn contents(&self) -> Option<&[u8]> {
        match &self.data {
            NodeData::File { contents } => Some(contents.as_slice()),
            NodeData::Dir { .. } => None,
        }
    }

    /// A mutable successor of this node-revision, at `path`, with id `id`.
    pub fn successor(&self, id: FlatId, path: &str) -> Self {
        Self {
            id,
            predecessor: Some(self.id.clone()),
            created_path: path.to_string(),
            copyfrom: None,
            is_copy_root: false,
            props: self.props.clone(),
            data: self.data.clone(),
        }
    }
}

/// A change to one path, as recorded in a transaction and a revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: PathChangeKind,
    pub node_id: FlatId,
    pub node_kind: NodeKind,
    pub text_mod: bool,
    pub prop_mod: bool,
}
