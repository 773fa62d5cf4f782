//! The filesystem handle and the path-level operations that need no handle.

use std::fmt;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rvfs_types::{path, Lock, PropMap, RevisionSpec, Revnum, Version};
use tracing::{debug, info};

use crate::backend::{FsBackend, FsLibrary, TxnFlags};
use crate::config::FsConfig;
use crate::context::{CancelFunc, FsAccess, FsContext};
use crate::error::{FsError, FsResult};
use crate::id::NodeId;
use crate::init;
use crate::lock::LockRequest;
use crate::registry::{self, Registry, DEFAULT_FS_TYPE, TYPE_MARKER_FILE};
use crate::root::{Root, RootKind};
use crate::txn::Transaction;
use crate::warning::WarningHandler;

/// An open filesystem.
///
/// Bound for its whole life to one storage path and one backend library.
/// Dropping the handle releases the backend's per-handle state; state the
/// backend shared through the initialization gate stays alive for other
/// handles.
pub struct Filesystem {
    path: PathBuf,
    fs_type: Arc<str>,
    library: Arc<dyn FsLibrary>,
    backend: Box<dyn FsBackend>,
    ctx: Arc<FsContext>,
}

impl Filesystem {
    /// Create new storage at `path` using the backend named by the
    /// `fs-type` config key, or [`DEFAULT_FS_TYPE`].
    pub fn create(registry: &Registry, path: &Path, config: FsConfig) -> FsResult<Self> {
        Self::create_with_context(registry, path, Arc::new(FsContext::new(config)))
    }

    /// [`create`](Self::create) with a caller-built context, so a warning
    /// sink or cancellation check is in place before the backend runs.
    pub fn create_with_context(
        registry: &Registry,
        path: &Path,
        ctx: Arc<FsContext>,
    ) -> FsResult<Self> {
        let fs_type = ctx.config().fs_type().unwrap_or(DEFAULT_FS_TYPE).to_string();
        let library = registry.resolve(&fs_type)?;

        prepare_storage_dir(path)?;
        registry::write_type_marker(path, &fs_type)?;

        let backend = library.create(path, Arc::clone(&ctx))?;
        let fs = Self::assemble(path, fs_type, library, backend, ctx)?;
        info!(path = %path.display(), fs_type = %fs.fs_type, "created filesystem");
        Ok(fs)
    }

    /// Open existing storage at `path`, picking the backend from its type
    /// marker.
    pub fn open(registry: &Registry, path: &Path, config: FsConfig) -> FsResult<Self> {
        Self::open_with_context(registry, path, Arc::new(FsContext::new(config)))
    }

    pub fn open_with_context(
        registry: &Registry,
        path: &Path,
        ctx: Arc<FsContext>,
    ) -> FsResult<Self> {
        let (fs_type, library) = registry.resolve_for_existing_storage(path)?;
        let backend = library.open(path, Arc::clone(&ctx))?;
        let fs = Self::assemble(path, fs_type, library, backend, ctx)?;
        debug!(path = %path.display(), fs_type = %fs.fs_type, "opened filesystem");
        Ok(fs)
    }

    fn assemble(
        path: &Path,
        fs_type: String,
        library: Arc<dyn FsLibrary>,
        backend: Box<dyn FsBackend>,
        ctx: Arc<FsContext>,
    ) -> FsResult<Self> {
        init::serialized_init(backend.as_ref())?;
        Ok(Self {
            path: path.to_path_buf(),
            fs_type: fs_type.into(),
            library,
            backend,
            ctx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    pub fn config(&self) -> &FsConfig {
        self.ctx.config()
    }

    pub fn context(&self) -> &Arc<FsContext> {
        &self.ctx
    }

    pub fn backend_version(&self) -> Version {
        self.library.version()
    }

    pub fn backend_description(&self) -> &str {
        self.library.description()
    }

    /// Replace the warning sink.
    pub fn set_warning(&self, handler: Arc<dyn WarningHandler>) {
        self.ctx.set_warning(handler);
    }

    /// Route a warning to the current sink.
    pub fn warn(&self, err: &FsError) {
        self.ctx.warn(err);
    }

    pub fn set_cancel(&self, cancel: Option<CancelFunc>) {
        self.ctx.set_cancel(cancel);
    }

    /// Set the acting user and the lock tokens they hold.
    pub fn set_access(&self, access: Option<FsAccess>) {
        self.ctx.set_access(access);
    }

    pub fn access(&self) -> Option<FsAccess> {
        self.ctx.access()
    }

    // ------------------------------------------------------------------
    // Revisions
    // ------------------------------------------------------------------

    pub fn youngest_rev(&self) -> FsResult<Revnum> {
        self.backend.youngest_rev()
    }

    fn resolve_rev(&self, spec: RevisionSpec) -> FsResult<Revnum> {
        let youngest = self.backend.youngest_rev()?;
        match spec {
            RevisionSpec::Youngest => Ok(youngest),
            RevisionSpec::Number(rev) if rev <= youngest => Ok(rev),
            RevisionSpec::Number(rev) => Err(FsError::NoSuchRevision(rev)),
        }
    }

    pub fn revision_prop(&self, rev: Revnum, name: &str) -> FsResult<Option<Vec<u8>>> {
        self.backend.revision_prop(rev, name)
    }

    pub fn revision_proplist(&self, rev: Revnum) -> FsResult<PropMap> {
        self.backend.revision_proplist(rev)
    }

    pub fn change_rev_prop(&self, rev: Revnum, name: &str, value: Option<&[u8]>) -> FsResult<()> {
        self.backend.change_rev_prop(rev, name, value)
    }

    pub fn get_uuid(&self) -> FsResult<String> {
        self.backend.get_uuid()
    }

    pub fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        self.backend.set_uuid(uuid)
    }

    pub fn deltify_revision(&self, rev: Revnum) -> FsResult<()> {
        self.backend.deltify(rev)
    }

    pub fn revision_root(&self, rev: RevisionSpec) -> FsResult<Root> {
        let rev = self.resolve_rev(rev)?;
        let backend = self.backend.revision_root(rev)?;
        Ok(Root::new(RootKind::Revision(rev), Arc::clone(&self.fs_type), backend))
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Begin a transaction. [`RevisionSpec::Youngest`] is resolved once,
    /// here, so the base cannot move under the caller.
    pub fn begin_txn(&self, base: RevisionSpec, flags: TxnFlags) -> FsResult<Transaction> {
        let base = self.resolve_rev(base)?;
        let backend = self.backend.begin_txn(base, flags)?;
        let txn = Transaction::new(Arc::clone(&self.fs_type), backend);
        debug!(txn = %txn.name(), base = %base, "began transaction");
        Ok(txn)
    }

    pub fn open_txn(&self, name: &str) -> FsResult<Transaction> {
        let backend = self.backend.open_txn(name)?;
        Ok(Transaction::new(Arc::clone(&self.fs_type), backend))
    }

    /// Remove an abandoned transaction by name.
    pub fn purge_txn(&self, name: &str) -> FsResult<()> {
        self.backend.purge_txn(name)?;
        info!(txn = name, "purged transaction");
        Ok(())
    }

    pub fn list_transactions(&self) -> FsResult<Vec<String>> {
        self.backend.list_transactions()
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Lock a path. The comment and expiration are checked before the
    /// backend is consulted.
    pub fn lock(&self, request: LockRequest) -> FsResult<Lock> {
        request.validate()?;
        let request = request.canonicalized();
        let lock = self.backend.lock(&request)?;
        info!(path = %lock.path, owner = %lock.owner, "locked path");
        Ok(lock)
    }

    pub fn generate_lock_token(&self) -> FsResult<String> {
        self.backend.generate_lock_token()
    }

    /// Remove the lock on `path`. Without `break_lock`, `token` must match.
    pub fn unlock(&self, path: &str, token: Option<&str>, break_lock: bool) -> FsResult<()> {
        let path = path::canonicalize(path);
        self.backend.unlock(&path, token, break_lock)?;
        info!(path = %path, break_lock, "unlocked path");
        Ok(())
    }

    pub fn get_lock(&self, path: &str) -> FsResult<Option<Lock>> {
        self.backend.get_lock(&path::canonicalize(path))
    }

    /// Stream every lock at or below `path` to `receiver`, which may return
    /// [`ControlFlow::Break`] to stop early.
    pub fn get_locks<F>(&self, path: &str, mut receiver: F) -> FsResult<()>
    where
        F: FnMut(&Lock) -> ControlFlow<()>,
    {
        self.backend
            .get_locks(&path::canonicalize(path), &mut receiver)
    }

    /// Parse a node id minted by this filesystem's backend.
    pub fn parse_id(&self, data: &[u8]) -> FsResult<NodeId> {
        NodeId::parse(&self.fs_type, self.library.as_ref(), data)
    }
}

impl fmt::Debug for Filesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filesystem")
            .field("path", &self.path)
            .field("fs_type", &self.fs_type)
            .finish_non_exhaustive()
    }
}

fn prepare_storage_dir(path: &Path) -> FsResult<()> {
    if path.is_dir() {
        if fs::read_dir(path)?.next().is_some() {
            return Err(FsError::AlreadyExists(path.display().to_string()));
        }
    } else if path.exists() {
        return Err(FsError::AlreadyExists(path.display().to_string()));
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Delete the storage at `path`. Needs no open handle.
pub fn delete_fs(registry: &Registry, path: &Path) -> FsResult<()> {
    let (fs_type, library) = registry.resolve_for_existing_storage(path)?;
    library.delete_fs(path)?;
    info!(path = %path.display(), fs_type = %fs_type, "deleted filesystem");
    Ok(())
}

/// Copy live storage from `src` to `dest`.
///
/// The backend copies its own data; the type marker is copied here as well,
/// so `dest` can be opened even if the backend does not know about it.
pub fn hotcopy(registry: &Registry, src: &Path, dest: &Path, clean: bool) -> FsResult<()> {
    let (fs_type, library) = registry.resolve_for_existing_storage(src)?;
    library.hotcopy(src, dest, clean)?;

    let marker = src.join(TYPE_MARKER_FILE);
    if marker.exists() {
        fs::copy(&marker, dest.join(TYPE_MARKER_FILE))?;
    }
    info!(src = %src.display(), dest = %dest.display(), fs_type = %fs_type, clean, "hotcopied filesystem");
    Ok(())
}

/// Run the backend's crash recovery on `path`. Needs no open handle.
pub fn recover(registry: &Registry, path: &Path, cancel: Option<&CancelFunc>) -> FsResult<()> {
    let (fs_type, library) = registry.resolve_for_existing_storage(path)?;
    library.recover(path, cancel)?;
    info!(path = %path.display(), fs_type = %fs_type, "recovered filesystem");
    Ok(())
}
