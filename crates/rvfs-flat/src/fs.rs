//! Per-handle state of an open flat filesystem.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rvfs_fs::{
    FsBackend, FsContext, FsError, FsResult, LockRequest, RootBackend, SharedScope, TxnBackend,
    TxnFlags,
};
use rvfs_types::{props, Lock, PropMap, Revnum, PROP_REVISION_AUTHOR};
use tracing::debug;

use crate::locks;
use crate::repo::{self, Repo};
use crate::root::FlatRoot;
use crate::staging::TxnState;
use crate::txn::FlatTxn;
use crate::CONFIG_FSYNC;

/// One handle. The [`Repo`] behind it is shared with every other handle on
/// the same path and is attached by [`FsBackend::serialized_init`].
pub struct FlatFs {
    path: PathBuf,
    ctx: Arc<FsContext>,
    repo: OnceLock<Arc<Repo>>,
}

impl FlatFs {
    pub fn new(path: &Path, ctx: Arc<FsContext>) -> Self {
        Self {
            path: path.to_path_buf(),
            ctx,
            repo: OnceLock::new(),
        }
    }

    fn repo(&self) -> FsResult<&Arc<Repo>> {
        self.repo
            .get()
            .ok_or_else(|| FsError::Internal("flat filesystem used before initialization".into()))
    }
}

impl FsBackend for FlatFs {
    fn serialized_init(&self, scope: &SharedScope) -> FsResult<()> {
        // The first handle on a path decides its fsync setting.
        let fsync = self.ctx.config().get_bool(CONFIG_FSYNC, false)?;
        let key = repo::scope_key(&self.path);
        let shared = scope.get_or_insert_with(&key, || Ok(Repo::open(&self.path, fsync)?))?;
        let _ = self.repo.set(shared);
        debug!(path = %self.path.display(), %key, "attached shared repository state");
        Ok(())
    }

    fn youngest_rev(&self) -> FsResult<Revnum> {
        self.repo()?.youngest()
    }

    fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.repo()?.revprops(rev)?.remove(name))
    }

    fn revision_proplist(&self, rev: Revnum) -> FsResult<PropMap> {
        self.repo()?.revprops(rev)
    }

    fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        let repo = self.repo()?;
        let _guard = repo.lock_writes()?;
        let mut revprops = repo.revprops(rev)?;
        props::apply_change(&mut revprops, name, value);
        repo.set_revprops(rev, &revprops)?;
        debug!(%rev, name, deleted = value.is_none(), "changed revision property");
        Ok(())
    }

    fn get_uuid(&self) -> FsResult<String> {
        self.repo()?.uuid()
    }

    fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        self.repo()?.set_uuid(uuid)
    }

    fn deltify(&self, rev: Revnum) -> FsResult<()> {
        let repo = self.repo()?;
        if rev > repo.youngest()? {
            return Err(FsError::NoSuchRevision(rev));
        }
        // Revision files are stored whole.
        debug!(%rev, "deltify is a no-op for flat storage");
        Ok(())
    }

    fn revision_root(&self, rev: Revnum) -> FsResult<Box<dyn RootBackend>> {
        let repo = self.repo()?;
        let file = repo.revision(rev)?;
        Ok(Box::new(FlatRoot::revision(Arc::clone(repo), file)))
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    fn begin_txn(&self, base: Revnum, flags: TxnFlags) -> FsResult<Box<dyn TxnBackend>> {
        let repo = self.repo()?;
        let name = {
            let _guard = repo.lock_writes()?;
            repo.next_txn_name(base)?
        };
        let root = repo.revision(base)?.root.clone();
        let mut state = TxnState::new(name.clone(), base, root, flags);
        if let Some(access) = self.ctx.access() {
            state
                .props
                .insert(PROP_REVISION_AUTHOR.to_string(), access.username.into_bytes());
        }
        {
            let _guard = repo.lock_txns()?;
            repo.save_txn(&state)?;
        }
        debug!(txn = %name, %base, flags = flags.bits(), "created transaction file");
        Ok(Box::new(FlatTxn::new(
            Arc::clone(repo),
            Arc::clone(&self.ctx),
            name,
            base,
        )))
    }

    fn open_txn(&self, name: &str) -> FsResult<Box<dyn TxnBackend>> {
        let repo = self.repo()?;
        let base = repo.with_txn(name, |state| Ok(state.base))?;
        Ok(Box::new(FlatTxn::new(
            Arc::clone(repo),
            Arc::clone(&self.ctx),
            name,
            base,
        )))
    }

    fn purge_txn(&self, name: &str) -> FsResult<()> {
        self.repo()?.remove_txn(name)
    }

    fn list_transactions(&self) -> FsResult<Vec<String>> {
        let repo = self.repo()?;
        let mut live = Vec::new();
        for name in repo.txn_names()? {
            match repo.with_txn(&name, |_| Ok(())) {
                Ok(()) => live.push(name),
                // Lost a race with commit or purge.
                Err(FsError::NoSuchTransaction(_)) => {}
                Err(err @ FsError::Corrupt(_)) => self.ctx.warn(&err),
                Err(err) => return Err(err),
            }
        }
        Ok(live)
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    fn lock(&self, request: &LockRequest) -> FsResult<Lock> {
        locks::lock(self.repo()?, &self.ctx, request)
    }

    fn generate_lock_token(&self) -> FsResult<String> {
        Ok(locks::new_token())
    }

    fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> FsResult<()> {
        locks::unlock(self.repo()?, &self.ctx, path, token, break_lock)
    }

    fn get_lock(&self, path: &str) -> FsResult<Option<Lock>> {
        locks::get_lock(self.repo()?, path)
    }

    fn get_locks(
        &self,
        path: &str,
        receiver: &mut dyn FnMut(&Lock) -> ControlFlow<()>,
    ) -> FsResult<()> {
        locks::get_locks(self.repo()?, path, receiver)
    }
}
