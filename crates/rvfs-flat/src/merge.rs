//! Three-way tree merge into a transaction.
//!
//! Given an ancestor tree A, a source tree S and the transaction's target
//! tree T, apply the differences between A and S to T. Directories are
//! merged entry by entry; anything else that changed on both sides is a
//! conflict.

use std::collections::BTreeSet;

use rvfs_fs::{FsResult, IdRelation};
use rvfs_types::path;
use tracing::debug;

use crate::id::FlatId;
use crate::noderev::NodeRev;
use crate::repo::Repo;
use crate::staging::TxnState;
use crate::tree::{self, NodeStore, TxnStore};

/// Merge `ancestor_path`→`source_path` changes into `target_path` of
/// `state`. Returns the first conflicting path.
///
/// On conflict `state` may hold a partial merge; callers merge into a copy.
pub fn merge(
    repo: &Repo,
    state: &mut TxnState,
    source: &dyn NodeStore,
    source_path: &str,
    target_path: &str,
    ancestor: &dyn NodeStore,
    ancestor_path: &str,
) -> FsResult<Option<String>> {
    let s = tree::lookup(source, source_path)?;
    let a = tree::lookup(ancestor, ancestor_path)?;
    let t = tree::lookup(&TxnStore { repo, state }, target_path)?;

    let sid = s.as_ref().map(|n| n.id.clone());
    let aid = a.as_ref().map(|n| n.id.clone());
    let tid = t.as_ref().map(|n| n.id.clone());
    if sid == aid || sid == tid {
        return Ok(None);
    }
    if tid == aid {
        take_source(repo, state, target_path, sid)?;
        return Ok(None);
    }
    match (s, t, a) {
        (Some(s), Some(t), Some(a)) if mergeable_dirs(&s, &t, &a) => {
            merge_dir(repo, state, source, ancestor, target_path, &s, &a)
        }
        _ => Ok(Some(target_path.to_string())),
    }
}

fn mergeable_dirs(s: &NodeRev, t: &NodeRev, a: &NodeRev) -> bool {
    s.entries().is_some()
        && t.entries().is_some()
        && a.entries().is_some()
        && s.id.relation(&a.id) != IdRelation::Unrelated
        && t.id.relation(&a.id) != IdRelation::Unrelated
}

fn take_source(
    repo: &Repo,
    state: &mut TxnState,
    target_path: &str,
    source: Option<FlatId>,
) -> FsResult<()> {
    match (path::split(target_path), source) {
        (Some((parent, name)), source) => {
            let dir = state.make_mut(repo, &parent)?;
            state.set_entry(&dir, &name, source)
        }
        (None, Some(root)) => {
            state.root = root;
            Ok(())
        }
        (None, None) => Ok(()),
    }
}

fn merge_dir(
    repo: &Repo,
    state: &mut TxnState,
    source: &dyn NodeStore,
    ancestor: &dyn NodeStore,
    path: &str,
    s: &NodeRev,
    a: &NodeRev,
) -> FsResult<Option<String>> {
    let t = tree::get(&TxnStore { repo, state }, path)?;

    if s.props != a.props {
        if t.props == a.props {
            state.set_props(repo, path, s.props.clone())?;
        } else if t.props != s.props {
            debug!(path, "property conflict");
            return Ok(Some(path.to_string()));
        }
    }

    let empty = Default::default();
    let s_entries = s.entries().unwrap_or(&empty);
    let a_entries = a.entries().unwrap_or(&empty);
    let t_entries = t.entries().cloned().unwrap_or_default();
    let names: BTreeSet<&String> = s_entries.keys().chain(a_entries.keys()).collect();

    for name in names {
        let se = s_entries.get(name);
        let ae = a_entries.get(name);
        let te = t_entries.get(name);
        if se == ae || se == te {
            continue;
        }
        if te == ae {
            let dir = state.make_mut(repo, path)?;
            state.set_entry(&dir, name, se.cloned())?;
            continue;
        }
        let child = path::join(path, name);
        if let (Some(se), Some(te), Some(ae)) = (se, te, ae) {
            let s_child = source.node(se)?;
            let a_child = ancestor.node(ae)?;
            let t_child = state.node(repo, te)?;
            if mergeable_dirs(&s_child, &t_child, &a_child) {
                if let Some(conflict) =
                    merge_dir(repo, state, source, ancestor, &child, &s_child, &a_child)?
                {
                    return Ok(Some(conflict));
                }
                continue;
            }
        }
        debug!(path = %child, "entry conflict");
        return Ok(Some(child));
    }
    // The merged directory now descends from the source's version.
    state.set_predecessor(repo, path, s.id.clone())?;
    Ok(None)
}
