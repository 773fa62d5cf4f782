//! Transaction state and the tree edits made inside it.
//!
//! A transaction starts as a pointer to its base revision's root. The first
//! edit below a directory clones every node on the path from the root into
//! a mutable successor ("making the path mutable"); later edits touch the
//! mutable copies in place. Nodes that were never edited stay shared with
//! the base revision.
//!
//! Every edit also folds into the transaction's change list, so that each
//! path carries at most one [`ChangeRecord`] describing its net change.

use std::collections::{BTreeMap, HashMap};

use rvfs_fs::{FsError, FsResult, TxnFlags};
use rvfs_types::{path, props, NodeKind, PathChangeKind, PropMap, Revnum};
use serde::{Deserialize, Serialize};

use crate::id::{FlatId, Origin};
use crate::layout::Current;
use crate::noderev::{ChangeRecord, CopyFrom, NodeData, NodeRev};
use crate::repo::Repo;
use crate::revfile::RevisionFile;
use crate::tree::{self, NodeStore, RevStore};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnState {
    pub name: String,
    pub base: Revnum,
    pub flags: u32,
    pub root: FlatId,
    /// Mutable node-revisions, by [`FlatId::key`].
    pub nodes: BTreeMap<String, NodeRev>,
    pub props: PropMap,
    pub changes: BTreeMap<String, ChangeRecord>,
    /// Transaction-local counters for `_`-prefixed ids.
    pub next_node: u64,
    pub next_copy: u64,
}

impl TxnState {
    pub fn new(name: impl Into<String>, base: Revnum, root: FlatId, flags: TxnFlags) -> Self {
        Self {
            name: name.into(),
            base,
            flags: flags.bits(),
            root,
            nodes: BTreeMap::new(),
            props: PropMap::new(),
            changes: BTreeMap::new(),
            next_node: 1,
            next_copy: 1,
        }
    }

    pub fn flags(&self) -> TxnFlags {
        TxnFlags::from_bits(self.flags)
    }

    pub fn node(&self, repo: &Repo, id: &FlatId) -> FsResult<NodeRev> {
        if id.is_mutable_in(&self.name) {
            self.nodes.get(&id.key()).cloned().ok_or_else(|| {
                FsError::Corrupt(format!("transaction '{}' has no node '{id}'", self.name))
            })
        } else {
            repo.node(id)
        }
    }

    fn origin(&self) -> Origin {
        Origin::Txn(self.name.clone())
    }

    fn alloc_node(&mut self) -> String {
        let n = self.next_node;
        self.next_node += 1;
        format!("_{n}")
    }

    fn alloc_copy(&mut self) -> String {
        let n = self.next_copy;
        self.next_copy += 1;
        format!("_{n}")
    }

    fn store(&mut self, node: NodeRev) {
        self.nodes.insert(node.id.key(), node);
    }

    fn mutable_node(&mut self, id: &FlatId) -> FsResult<&mut NodeRev> {
        let name = self.name.clone();
        self.nodes
            .get_mut(&id.key())
            .ok_or_else(|| FsError::Corrupt(format!("transaction '{name}' has no node '{id}'")))
    }

    /// Id for a mutable successor of `of`. Keeps the node and copy ids
    /// unless that key is already taken in this transaction.
    fn successor_id(&mut self, of: &FlatId) -> FlatId {
        let mut id = FlatId::new(of.node.clone(), of.copy.clone(), self.origin());
        if self.nodes.contains_key(&id.key()) {
            id.copy = self.alloc_copy();
        }
        id
    }

    /// Make every node from the root down to `path` mutable and return the
    /// id of the node at `path`.
    pub fn make_mut(&mut self, repo: &Repo, path: &str) -> FsResult<FlatId> {
        let Some((parent, name)) = path::split(path) else {
            if self.root.is_mutable_in(&self.name) {
                return Ok(self.root.clone());
            }
            let root = self.node(repo, &self.root)?;
            let id = self.successor_id(&root.id);
            self.store(root.successor(id.clone(), path::ROOT));
            self.root = id.clone();
            return Ok(id);
        };
        let parent_id = self.make_mut(repo, &parent)?;
        let child_id = self
            .mutable_node(&parent_id)?
            .entries()
            .ok_or_else(|| FsError::NotDirectory(parent.clone()))?
            .get(&name)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if child_id.is_mutable_in(&self.name) {
            return Ok(child_id);
        }
        let child = self.node(repo, &child_id)?;
        let id = self.successor_id(&child_id);
        self.store(child.successor(id.clone(), path));
        self.set_entry(&parent_id, &name, Some(id.clone()))?;
        Ok(id)
    }

    /// Point `name` in mutable directory `dir` at `id`, or remove it.
    pub fn set_entry(&mut self, dir: &FlatId, name: &str, id: Option<FlatId>) -> FsResult<()> {
        let dir_node = self.mutable_node(dir)?;
        let entries = dir_node
            .entries_mut()
            .ok_or_else(|| FsError::NotDirectory(dir.to_string()))?;
        match id {
            Some(id) => {
                entries.insert(name.to_string(), id);
            }
            None => {
                entries.remove(name);
            }
        }
        Ok(())
    }

    /// Make the directory at `path` mutable and hand back its id and
    /// current entries.
    fn mutable_dir(
        &mut self,
        repo: &Repo,
        path: &str,
    ) -> FsResult<(FlatId, BTreeMap<String, FlatId>)> {
        let id = self.make_mut(repo, path)?;
        let entries = self
            .mutable_node(&id)?
            .entries()
            .cloned()
            .ok_or_else(|| FsError::NotDirectory(path.to_string()))?;
        Ok((id, entries))
    }

    /// Forget a removed mutable subtree.
    fn drop_mutable(&mut self, id: &FlatId) {
        if !id.is_mutable_in(&self.name) {
            return;
        }
        if let Some(node) = self.nodes.remove(&id.key()) {
            if let Some(entries) = node.entries() {
                for child in entries.values() {
                    self.drop_mutable(child);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Change folding
    // ------------------------------------------------------------------

    fn record_add(&mut self, path: &str, id: &FlatId, node_kind: NodeKind) {
        let kind = match self.changes.get(path).map(|c| c.kind) {
            Some(PathChangeKind::Delete) => PathChangeKind::Replace,
            _ => PathChangeKind::Add,
        };
        self.changes.insert(
            path.to_string(),
            ChangeRecord {
                kind,
                node_id: id.clone(),
                node_kind,
                text_mod: false,
                prop_mod: false,
            },
        );
    }

    fn record_delete(&mut self, path: &str, id: &FlatId, node_kind: NodeKind) {
        let prior = self.changes.get(path).map(|c| c.kind);
        self.changes.retain(|p, _| !path::is_ancestor(path, p));
        if prior == Some(PathChangeKind::Add) {
            return;
        }
        self.changes.insert(
            path.to_string(),
            ChangeRecord {
                kind: PathChangeKind::Delete,
                node_id: id.clone(),
                node_kind,
                text_mod: false,
                prop_mod: false,
            },
        );
    }

    fn record_modify(&mut self, path: &str, id: &FlatId, node_kind: NodeKind, text: bool, prop: bool) {
        match self.changes.get_mut(path) {
            Some(rec) if rec.kind != PathChangeKind::Delete => {
                rec.node_id = id.clone();
                rec.text_mod |= text;
                rec.prop_mod |= prop;
            }
            _ => {
                self.changes.insert(
                    path.to_string(),
                    ChangeRecord {
                        kind: PathChangeKind::Modify,
                        node_id: id.clone(),
                        node_kind,
                        text_mod: text,
                        prop_mod: prop,
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Edits
    // ------------------------------------------------------------------

    /// Create an empty file or directory at `path`.
    pub fn make_node(&mut self, repo: &Repo, path: &str, kind: NodeKind) -> FsResult<()> {
        let (parent, name) =
            path::split(path).ok_or_else(|| FsError::AlreadyExists(path.to_string()))?;
        let (parent_id, entries) = self.mutable_dir(repo, &parent)?;
        if entries.contains_key(&name) {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        let id = FlatId::new(self.alloc_node(), parent_id.copy.clone(), self.origin());
        let node = match kind {
            NodeKind::Dir => NodeRev::new_dir(id.clone(), path),
            NodeKind::File => NodeRev::new_file(id.clone(), path),
            NodeKind::None => {
                return Err(FsError::InvalidParameter("cannot create a node of kind none".into()))
            }
        };
        self.store(node);
        self.set_entry(&parent_id, &name, Some(id.clone()))?;
        self.record_add(path, &id, kind);
        Ok(())
    }

    /// Remove `path` and everything below it.
    pub fn delete(&mut self, repo: &Repo, path: &str) -> FsResult<()> {
        let (parent, name) = path::split(path)
            .ok_or_else(|| FsError::InvalidParameter("cannot delete the root directory".into()))?;
        let (parent_id, entries) = self.mutable_dir(repo, &parent)?;
        let removed = entries
            .get(&name)
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        let node = self.node(repo, &removed)?;
        self.set_entry(&parent_id, &name, None)?;
        self.drop_mutable(&removed);

        // The record names what the base revision had here, if anything.
        let (recorded, kind) = match self.base_node(repo, path)? {
            Some(base) => (base.id.clone(), base.kind()),
            None => (removed, node.kind()),
        };
        self.record_delete(path, &recorded, kind);
        Ok(())
    }

    fn base_node(&self, repo: &Repo, path: &str) -> FsResult<Option<NodeRev>> {
        let file = repo.revision(self.base)?;
        tree::lookup(&RevStore { repo, file: &file }, path)
    }

    /// Copy `from_path` of revision `from_rev` to `to_path`, replacing
    /// whatever is there.
    pub fn copy(
        &mut self,
        repo: &Repo,
        from: &dyn NodeStore,
        from_rev: Revnum,
        from_path: &str,
        to_path: &str,
    ) -> FsResult<()> {
        let src = tree::get(from, from_path)?;
        let (parent, name) =
            path::split(to_path).ok_or_else(|| FsError::AlreadyExists(to_path.to_string()))?;
        let (parent_id, entries) = self.mutable_dir(repo, &parent)?;
        if entries.contains_key(&name) {
            self.delete(repo, to_path)?;
        }
        let copy_id = self.alloc_copy();
        let id = self.copy_tree(from, &src, from_rev, from_path, to_path, &copy_id, true)?;
        self.set_entry(&parent_id, &name, Some(id.clone()))?;
        self.record_add(to_path, &id, src.kind());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_tree(
        &mut self,
        from: &dyn NodeStore,
        src: &NodeRev,
        from_rev: Revnum,
        from_path: &str,
        to_path: &str,
        copy_id: &str,
        copy_root: bool,
    ) -> FsResult<FlatId> {
        let id = FlatId::new(src.id.node.clone(), copy_id, self.origin());
        let mut node = src.successor(id.clone(), to_path);
        node.copyfrom = Some(CopyFrom {
            rev: from_rev,
            path: from_path.to_string(),
        });
        node.is_copy_root = copy_root;
        if let Some(entries) = node.entries_mut() {
            for (name, child_id) in entries.iter_mut() {
                let child = from.node(child_id)?;
                *child_id = self.copy_tree(
                    from,
                    &child,
                    from_rev,
                    &path::join(from_path, name),
                    &path::join(to_path, name),
                    copy_id,
                    false,
                )?;
            }
        }
        self.store(node);
        Ok(id)
    }

    /// Point `path` at the node it has in `from`, without copy history.
    pub fn link(&mut self, repo: &Repo, from: &dyn NodeStore, path: &str) -> FsResult<()> {
        let src = tree::get(from, path)?;
        let (parent, name) = path::split(path)
            .ok_or_else(|| FsError::InvalidParameter("cannot link the root directory".into()))?;
        let (parent_id, entries) = self.mutable_dir(repo, &parent)?;
        match entries.get(&name) {
            Some(existing) if *existing == src.id => return Ok(()),
            Some(_) => self.delete(repo, path)?,
            None => {}
        }
        self.set_entry(&parent_id, &name, Some(src.id.clone()))?;
        self.record_add(path, &src.id, src.kind());
        Ok(())
    }

    pub fn set_contents(&mut self, repo: &Repo, path: &str, contents: Vec<u8>) -> FsResult<()> {
        let id = self.make_mut(repo, path)?;
        match &mut self.mutable_node(&id)?.data {
            NodeData::File { contents: current } => *current = contents,
            NodeData::Dir { .. } => return Err(FsError::NotFile(path.to_string())),
        }
        self.record_modify(path, &id, NodeKind::File, true, false);
        Ok(())
    }

    pub fn change_prop(
        &mut self,
        repo: &Repo,
        path: &str,
        name: &str,
        value: Option<&[u8]>,
    ) -> FsResult<()> {
        let id = self.make_mut(repo, path)?;
        let node = self.mutable_node(&id)?;
        props::apply_change(&mut node.props, name, value);
        let kind = node.kind();
        self.record_modify(path, &id, kind, false, true);
        Ok(())
    }

    /// Replace the properties of `path` without recording a change.
    pub fn set_props(&mut self, repo: &Repo, path: &str, props: PropMap) -> FsResult<()> {
        let id = self.make_mut(repo, path)?;
        self.mutable_node(&id)?.props = props;
        Ok(())
    }

    pub fn set_predecessor(&mut self, repo: &Repo, path: &str, pred: FlatId) -> FsResult<()> {
        let id = self.make_mut(repo, path)?;
        self.mutable_node(&id)?.predecessor = Some(pred);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Turn this transaction into revision `rev`, numbering new ids from
    /// `counters`. Only mutable nodes reachable from the root are kept.
    pub fn into_revision(self, rev: Revnum, counters: Current) -> FsResult<RevisionFile> {
        if !self.root.is_mutable_in(&self.name) {
            return Err(FsError::Internal(format!(
                "transaction '{}' root is not mutable at commit",
                self.name
            )));
        }
        let mut renumber = Renumber {
            txn: &self.name,
            rev,
            nodes: HashMap::new(),
            copies: HashMap::new(),
            next_node: counters.next_node,
            next_copy: counters.next_copy,
        };
        let mut nodes = self.nodes;
        let mut out = BTreeMap::new();
        let mut stack = vec![self.root.clone()];
        while let Some(id) = stack.pop() {
            if !id.is_mutable_in(&self.name) {
                continue;
            }
            let mut node = nodes
                .remove(&id.key())
                .ok_or_else(|| FsError::Corrupt(format!("transaction '{}' has no node '{id}'", self.name)))?;
            node.id = renumber.id(&node.id);
            node.predecessor = node.predecessor.map(|p| renumber.id(&p));
            if let Some(entries) = node.entries_mut() {
                for child in entries.values_mut() {
                    stack.push(child.clone());
                    *child = renumber.id(child);
                }
            }
            out.insert(node.id.key(), node);
        }
        let root = renumber.id(&self.root);
        let changes = self
            .changes
            .into_iter()
            .map(|(path, mut rec)| {
                rec.node_id = renumber.id(&rec.node_id);
                (path, rec)
            })
            .collect();
        Ok(RevisionFile {
            rev,
            root,
            nodes: out,
            changes,
            next_node: renumber.next_node,
            next_copy: renumber.next_copy,
        })
    }
}

/// Maps transaction-local ids onto repository-wide ones.
struct Renumber<'a> {
    txn: &'a str,
    rev: Revnum,
    nodes: HashMap<String, String>,
    copies: HashMap<String, String>,
    next_node: u64,
    next_copy: u64,
}

impl Renumber<'_> {
    fn id(&mut self, id: &FlatId) -> FlatId {
        if !id.is_mutable_in(self.txn) {
            return id.clone();
        }
        let node = counter(&id.node, &mut self.nodes, &mut self.next_node);
        let copy = counter(&id.copy, &mut self.copies, &mut self.next_copy);
        FlatId::new(node, copy, Origin::Rev(self.rev))
    }
}

fn counter(local: &str, seen: &mut HashMap<String, String>, next: &mut u64) -> String {
    if !local.starts_with('_') {
        return local.to_string();
    }
    seen.entry(local.to_string())
        .or_insert_with(|| {
            let n = *next;
            *next += 1;
            n.to_string()
        })
        .clone()
}
