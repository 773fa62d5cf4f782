//! Transactions of the flat backend, and commit.

use std::sync::Arc;

use chrono::Utc;
use rvfs_fs::{FsContext, FsError, FsResult, RootBackend, TxnBackend, TxnFlags};
use rvfs_types::{props, PropMap, Revnum, PROP_REVISION_DATE};
use tracing::{debug, info};

use crate::locks;
use crate::merge;
use crate::repo::Repo;
use crate::revfile::{self, REV_MAGIC};
use crate::root::FlatRoot;
use crate::tree::RevStore;

pub struct FlatTxn {
    repo: Arc<Repo>,
    ctx: Arc<FsContext>,
    name: String,
    base: Revnum,
}

impl FlatTxn {
    pub fn new(repo: Arc<Repo>, ctx: Arc<FsContext>, name: impl Into<String>, base: Revnum) -> Self {
        Self {
            repo,
            ctx,
            name: name.into(),
            base,
        }
    }
}

impl TxnBackend for FlatTxn {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_revision(&self) -> Revnum {
        self.base
    }

    /// Commit protocol, under the repository write lock:
    ///
    /// 1. Refuse if out of date (with `CHECK_OOD`) or if a changed path is
    ///    locked by someone else (with `CHECK_LOCKS`).
    /// 2. If revisions landed since the base, merge them in. A conflict
    ///    fails the commit and leaves the transaction untouched.
    /// 3. Write the revision file, then its properties, then `current`.
    ///    Readers only see the new revision once `current` names it.
    fn commit(&self) -> FsResult<Revnum> {
        let _write = self.repo.lock_writes()?;
        let _txns = self.repo.lock_txns()?;
        let mut state = self.repo.load_txn(&self.name)?;
        let current = self.repo.current()?;
        let youngest = current.youngest;

        if state.flags().contains(TxnFlags::CHECK_OOD) && youngest != state.base {
            return Err(FsError::OutOfDate(format!(
                "transaction '{}' is based on revision {} but the youngest is {youngest}",
                self.name, state.base
            )));
        }
        if state.flags().contains(TxnFlags::CHECK_LOCKS) {
            locks::verify_commit(&self.repo, &self.ctx, &state.changes)?;
        }

        if youngest != state.base {
            let source = self.repo.revision(youngest)?;
            let ancestor = self.repo.revision(state.base)?;
            let mut merged = state.clone();
            let conflict = merge::merge(
                &self.repo,
                &mut merged,
                &RevStore { repo: &self.repo, file: &source },
                "/",
                "/",
                &RevStore { repo: &self.repo, file: &ancestor },
                "/",
            )?;
            if let Some(path) = conflict {
                info!(txn = %self.name, %path, "commit conflict");
                return Err(FsError::Conflict { path });
            }
            debug!(txn = %self.name, from = %state.base, to = %youngest, "merged transaction forward");
            merged.base = youngest;
            state = merged;
        }

        state.make_mut(&self.repo, "/")?;
        let rev = youngest.next();
        let mut revprops = std::mem::take(&mut state.props);
        revprops.insert(
            PROP_REVISION_DATE.to_string(),
            Utc::now().to_rfc3339().into_bytes(),
        );
        let file = state.into_revision(rev, current)?;

        let layout = self.repo.layout();
        let fsync = self.repo.fsync();
        revfile::write(REV_MAGIC, &file, &layout.rev(rev), fsync)?;
        self.repo.set_revprops(rev, &revprops)?;
        file.counters().write(layout, fsync)?;

        self.repo.delete_txn_file(&self.name)?;
        let changed = file.changes.len();
        self.repo.cache_revision(Arc::new(file))?;
        debug!(txn = %self.name, %rev, changed, "wrote revision");
        Ok(rev)
    }

    fn abort(&self) -> FsResult<()> {
        self.repo.remove_txn(&self.name)
    }

    fn prop(&self, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.repo
            .with_txn(&self.name, |state| Ok(state.props.get(name).cloned()))
    }

    fn proplist(&self) -> FsResult<PropMap> {
        self.repo.with_txn(&self.name, |state| Ok(state.props.clone()))
    }

    fn change_prop(&self, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.repo.with_txn_mut(&self.name, |state| {
            props::apply_change(&mut state.props, name, value);
            Ok(())
        })
    }

    fn root(&self) -> FsResult<Box<dyn RootBackend>> {
        // Fail now rather than on first use if the transaction is gone.
        self.repo.with_txn(&self.name, |_| Ok(()))?;
        Ok(Box::new(FlatRoot::txn(Arc::clone(&self.repo), self.name.clone())))
    }
}
