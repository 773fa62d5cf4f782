//! Shared fixtures for the unit tests.

use std::sync::Arc;

use rvfs_fs::{Filesystem, FsAccess, FsConfig, LogWarnings, Registry, TxnFlags};
use rvfs_types::Revnum;
use tempfile::TempDir;

use crate::repo::Repo;
use crate::revfile::{self, RevisionFile, REV_MAGIC};
use crate::staging::TxnState;

pub fn repo() -> (TempDir, Repo) {
    let dir = tempfile::tempdir().unwrap();
    Repo::create(dir.path(), false).unwrap();
    let repo = Repo::open(dir.path(), false).unwrap();
    (dir, repo)
}

/// A fresh transaction state on `base`, bypassing the transaction files.
pub fn txn_on(repo: &Repo, base: Revnum) -> TxnState {
    let name = repo.next_txn_name(base).unwrap();
    let root = repo.revision(base).unwrap().root.clone();
    TxnState::new(name, base, root, TxnFlags::NONE)
}

/// Write `state` as the next revision, skipping merge and lock checks.
pub fn commit(repo: &Repo, mut state: TxnState) -> RevisionFile {
    state.make_mut(repo, "/").unwrap();
    let counters = repo.current().unwrap();
    let rev = counters.youngest.next();
    let file = state.into_revision(rev, counters).unwrap();
    revfile::write(REV_MAGIC, &file, &repo.layout().rev(rev), false).unwrap();
    file.counters().write(repo.layout(), false).unwrap();
    file
}

pub fn registry() -> Registry {
    Registry::new(crate::version()).with(crate::descriptor()).unwrap()
}

/// A new flat filesystem at `<tmp>/repo`, acting as user "alice".
pub fn flat_fs() -> (TempDir, Filesystem) {
    let dir = tempfile::tempdir().unwrap();
    let fs = Filesystem::create(&registry(), &dir.path().join("repo"), FsConfig::new()).unwrap();
    fs.set_warning(Arc::new(LogWarnings));
    fs.set_access(Some(FsAccess::new("alice")));
    (dir, fs)
}
