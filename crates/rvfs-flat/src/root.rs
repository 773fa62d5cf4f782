//! Revision and transaction roots of the flat backend.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use rvfs_fs::{DirEntry, FsError, FsResult, HistoryBackend, NodeId, PathChange, RootBackend};
use rvfs_types::{Checksum, NodeKind, PropMap, Revnum, TextDelta};

use crate::history::FlatHistory;
use crate::merge;
use crate::noderev::{ChangeRecord, NodeRev};
use crate::repo::Repo;
use crate::revfile::RevisionFile;
use crate::staging::TxnState;
use crate::tree::{self, NodeStore, RevStore, TxnStore};

enum Target {
    Rev(Arc<RevisionFile>),
    Txn(String),
}

pub struct FlatRoot {
    repo: Arc<Repo>,
    target: Target,
}

impl FlatRoot {
    pub fn revision(repo: Arc<Repo>, file: Arc<RevisionFile>) -> Self {
        Self {
            repo,
            target: Target::Rev(file),
        }
    }

    pub fn txn(repo: Arc<Repo>, name: impl Into<String>) -> Self {
        Self {
            repo,
            target: Target::Txn(name.into()),
        }
    }

    fn read<R>(&self, f: impl FnOnce(&dyn NodeStore) -> FsResult<R>) -> FsResult<R> {
        match &self.target {
            Target::Rev(file) => f(&RevStore {
                repo: &self.repo,
                file,
            }),
            Target::Txn(name) => self.repo.with_txn(name, |state| {
                f(&TxnStore {
                    repo: &self.repo,
                    state,
                })
            }),
        }
    }

    fn edit<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&Repo, &mut TxnState) -> FsResult<R>,
    ) -> FsResult<R> {
        match &self.target {
            Target::Rev(_) => Err(FsError::ReadOnlyRoot { operation }),
            Target::Txn(name) => self.repo.with_txn_mut(name, |state| f(&self.repo, state)),
        }
    }

    fn rev_file(&self, operation: &'static str) -> FsResult<&Arc<RevisionFile>> {
        match &self.target {
            Target::Rev(file) => Ok(file),
            Target::Txn(_) => Err(FsError::NotRevisionRoot { operation }),
        }
    }

    fn downcast(root: &dyn RootBackend) -> FsResult<&FlatRoot> {
        root.as_any()
            .downcast_ref::<FlatRoot>()
            .ok_or_else(|| FsError::InvalidParameter("root belongs to another backend".into()))
    }

    fn node(&self, path: &str) -> FsResult<NodeRev> {
        self.read(|store| tree::get(store, path))
    }

    fn file_data(&self, path: &str) -> FsResult<Vec<u8>> {
        self.read(|store| {
            let node = tree::get_file(store, path)?;
            Ok(node.contents().unwrap_or_default().to_vec())
        })
    }
}

fn verify(path: &str, expected: Option<&Checksum>, data: &[u8]) -> FsResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = Checksum::of(data);
    if actual != *expected {
        return Err(FsError::ChecksumMismatch {
            path: path.to_string(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}

impl RootBackend for FlatRoot {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn paths_changed(&self) -> FsResult<BTreeMap<String, PathChange>> {
        let convert = |changes: &BTreeMap<String, ChangeRecord>| -> BTreeMap<String, PathChange> {
            changes
                .iter()
                .map(|(path, rec)| {
                    let change = PathChange {
                        node_id: rec.node_id.to_node_id(),
                        change_kind: rec.kind,
                        text_mod: rec.text_mod,
                        prop_mod: rec.prop_mod,
                    };
                    (path.clone(), change)
                })
                .collect()
        };
        match &self.target {
            Target::Rev(file) => Ok(convert(&file.changes)),
            Target::Txn(name) => self.repo.with_txn(name, |state| Ok(convert(&state.changes))),
        }
    }

    fn check_path(&self, path: &str) -> FsResult<NodeKind> {
        self.read(|store| Ok(tree::lookup(store, path)?.map_or(NodeKind::None, |n| n.kind())))
    }

    fn node_history(&self, path: &str) -> FsResult<Box<dyn HistoryBackend>> {
        let file = self.rev_file("node history")?;
        let node = self.node(path)?;
        Ok(Box::new(FlatHistory::new(
            Arc::clone(&self.repo),
            path,
            file.rev,
            node.id,
        )))
    }

    fn node_id(&self, path: &str) -> FsResult<NodeId> {
        Ok(self.node(path)?.id.to_node_id())
    }

    fn node_created_rev(&self, path: &str) -> FsResult<Option<Revnum>> {
        Ok(self.node(path)?.id.rev())
    }

    fn node_created_path(&self, path: &str) -> FsResult<String> {
        Ok(self.node(path)?.created_path)
    }

    fn node_prop(&self, path: &str, name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.node(path)?.props.get(name).cloned())
    }

    fn node_proplist(&self, path: &str) -> FsResult<PropMap> {
        Ok(self.node(path)?.props)
    }

    fn change_node_prop(&self, path: &str, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.edit("change node property", |repo, state| {
            state.change_prop(repo, path, name, value)
        })
    }

    fn props_changed(
        &self,
        path: &str,
        other: &dyn RootBackend,
        other_path: &str,
    ) -> FsResult<bool> {
        let other = Self::downcast(other)?;
        Ok(self.node(path)?.props != other.node(other_path)?.props)
    }

    fn contents_changed(
        &self,
        path: &str,
        other: &dyn RootBackend,
        other_path: &str,
    ) -> FsResult<bool> {
        let other = Self::downcast(other)?;
        Ok(self.file_data(path)? != other.file_data(other_path)?)
    }

    fn copied_from(&self, path: &str) -> FsResult<Option<(Revnum, String)>> {
        let node = self.node(path)?;
        Ok(match node.copyfrom {
            Some(from) if node.is_copy_root => Some((from.rev, from.path)),
            _ => None,
        })
    }

    fn merge(
        &self,
        source: &dyn RootBackend,
        source_path: &str,
        target_path: &str,
        ancestor: &dyn RootBackend,
        ancestor_path: &str,
    ) -> FsResult<Option<String>> {
        let source = Self::downcast(source)?.rev_file("merge source")?;
        let ancestor = Self::downcast(ancestor)?.rev_file("merge ancestor")?;
        self.edit("merge", |repo, state| {
            let mut work = state.clone();
            let conflict = merge::merge(
                repo,
                &mut work,
                &RevStore { repo, file: source },
                source_path,
                target_path,
                &RevStore { repo, file: ancestor },
                ancestor_path,
            )?;
            if conflict.is_none() {
                *state = work;
            }
            Ok(conflict)
        })
    }

    fn dir_entries(&self, path: &str) -> FsResult<BTreeMap<String, DirEntry>> {
        self.read(|store| {
            let dir = tree::get_dir(store, path)?;
            let mut out = BTreeMap::new();
            for (name, id) in dir.entries().into_iter().flatten() {
                let kind = store.node(id)?.kind();
                out.insert(
                    name.clone(),
                    DirEntry {
                        name: name.clone(),
                        kind,
                        id: id.to_node_id(),
                    },
                );
            }
            Ok(out)
        })
    }

    fn make_dir(&self, path: &str) -> FsResult<()> {
        self.edit("make directory", |repo, state| {
            state.make_node(repo, path, NodeKind::Dir)
        })
    }

    fn make_file(&self, path: &str) -> FsResult<()> {
        self.edit("make file", |repo, state| {
            state.make_node(repo, path, NodeKind::File)
        })
    }

    fn delete_node(&self, path: &str) -> FsResult<()> {
        self.edit("delete", |repo, state| state.delete(repo, path))
    }

    fn copy(&self, from: &dyn RootBackend, from_path: &str, to_path: &str) -> FsResult<()> {
        let file = Self::downcast(from)?.rev_file("copy source")?;
        self.edit("copy", |repo, state| {
            state.copy(repo, &RevStore { repo, file }, file.rev, from_path, to_path)
        })
    }

    fn revision_link(&self, from: &dyn RootBackend, path: &str) -> FsResult<()> {
        let file = Self::downcast(from)?.rev_file("revision link source")?;
        self.edit("revision link", |repo, state| {
            state.link(repo, &RevStore { repo, file }, path)
        })
    }

    fn file_length(&self, path: &str) -> FsResult<u64> {
        Ok(self.file_data(path)?.len() as u64)
    }

    fn file_checksum(&self, path: &str) -> FsResult<Checksum> {
        Ok(Checksum::of(&self.file_data(path)?))
    }

    fn file_contents(&self, path: &str) -> FsResult<Bytes> {
        Ok(Bytes::from(self.file_data(path)?))
    }

    fn apply_textdelta(
        &self,
        path: &str,
        delta: &TextDelta,
        base_checksum: Option<&Checksum>,
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        self.edit("apply text delta", |repo, state| {
            let base = tree::get_file(&TxnStore { repo, state }, path)?;
            let base = base.contents().unwrap_or_default();
            verify(path, base_checksum, base)?;
            let target = delta.apply(base)?;
            verify(path, result_checksum, &target)?;
            state.set_contents(repo, path, target)
        })
    }

    fn apply_text(
        &self,
        path: &str,
        contents: &[u8],
        result_checksum: Option<&Checksum>,
    ) -> FsResult<()> {
        self.edit("apply text", |repo, state| {
            tree::get_file(&TxnStore { repo, state }, path)?;
            verify(path, result_checksum, contents)?;
            state.set_contents(repo, path, contents.to_vec())
        })
    }

    fn get_file_delta_stream(
        &self,
        source: Option<(&dyn RootBackend, &str)>,
        target_path: &str,
    ) -> FsResult<TextDelta> {
        let source = match source {
            Some((root, path)) => Self::downcast(root)?.file_data(path)?,
            None => Vec::new(),
        };
        let target = self.file_data(target_path)?;
        Ok(TextDelta::compute(&source, &target))
    }
}
