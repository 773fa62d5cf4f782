//! One flat repository on disk, shared by every handle opened on it in this
//! process.
//!
//! # Design Rules
//!
//! - Revision files are immutable once `current` names them, so they are
//!   cached forever.
//! - `write_lock` serializes everything that changes repository-wide state:
//!   commits, revision properties, the lock table, transaction naming.
//! - `txn_lock` serializes read-modify-write of transaction files. When both
//!   are needed, `write_lock` is taken first.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;
use rvfs_fs::{FsError, FsResult};
use rvfs_types::{Lock, PropMap, Revnum, PROP_REVISION_DATE};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{FlatError, FlatResult};
use crate::id::FlatId;
use crate::layout::{self, Current, Layout, FORMAT, TXN_EXT};
use crate::noderev::NodeRev;
use crate::revfile::{self, RevisionFile, REV_MAGIC, TXN_MAGIC};
use crate::staging::TxnState;

/// Locks by path.
pub type LockTable = BTreeMap<String, Lock>;

pub struct Repo {
    layout: Layout,
    fsync: bool,
    write_lock: Mutex<()>,
    txn_lock: Mutex<()>,
    revisions: RwLock<HashMap<Revnum, Arc<RevisionFile>>>,
}

/// Key of a repository in the process-wide shared scope.
pub fn scope_key(path: &Path) -> String {
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    format!("rvfs-flat:{}", path.display())
}

fn poisoned<T>(_: PoisonError<T>) -> FsError {
    FsError::Internal("flat repository lock poisoned".into())
}

impl Repo {
    /// Lay out a new repository holding only revision 0.
    pub fn create(path: &Path, fsync: bool) -> FlatResult<()> {
        let layout = Layout::new(path);
        layout.create_dirs()?;
        layout::write_atomic(&layout.format(), format!("{FORMAT}\n").as_bytes(), fsync)?;
        let uuid = Uuid::now_v7().to_string();
        layout::write_atomic(&layout.uuid(), format!("{uuid}\n").as_bytes(), fsync)?;
        layout::write_atomic(&layout.txn_current(), b"0\n", fsync)?;

        let root = FlatId::root_zero();
        let mut nodes = BTreeMap::new();
        nodes.insert(root.key(), NodeRev::new_dir(root.clone(), "/"));
        let initial = Current::initial();
        let rev0 = RevisionFile {
            rev: Revnum::ZERO,
            root,
            nodes,
            changes: BTreeMap::new(),
            next_node: initial.next_node,
            next_copy: initial.next_copy,
        };
        revfile::write(REV_MAGIC, &rev0, &layout.rev(Revnum::ZERO), fsync)?;

        let mut props = PropMap::new();
        props.insert(
            PROP_REVISION_DATE.to_string(),
            Utc::now().to_rfc3339().into_bytes(),
        );
        write_revprops(&layout, Revnum::ZERO, &props, fsync)?;

        initial.write(&layout, fsync)?;
        info!(path = %path.display(), %uuid, "created flat repository");
        Ok(())
    }

    pub fn open(path: &Path, fsync: bool) -> FlatResult<Self> {
        let layout = Layout::new(path);
        let found = layout::read_string(&layout.format())?;
        let found = found.trim();
        if found.parse::<u32>().ok() != Some(FORMAT) {
            return Err(FlatError::Format {
                found: found.to_string(),
                expected: FORMAT,
            });
        }
        debug!(path = %path.display(), fsync, "opened flat repository");
        Ok(Self {
            layout,
            fsync,
            write_lock: Mutex::new(()),
            txn_lock: Mutex::new(()),
            revisions: RwLock::new(HashMap::new()),
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn fsync(&self) -> bool {
        self.fsync
    }

    pub fn lock_writes(&self) -> FsResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(poisoned)
    }

    pub fn current(&self) -> FsResult<Current> {
        Ok(Current::read(&self.layout)?)
    }

    pub fn youngest(&self) -> FsResult<Revnum> {
        Ok(self.current()?.youngest)
    }

    fn check_rev(&self, rev: Revnum) -> FsResult<()> {
        if rev > self.youngest()? {
            return Err(FsError::NoSuchRevision(rev));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Revisions and node-revisions
    // ------------------------------------------------------------------

    pub fn revision(&self, rev: Revnum) -> FsResult<Arc<RevisionFile>> {
        if let Some(cached) = self
            .revisions
            .read()
            .map_err(poisoned)?
            .get(&rev)
            .cloned()
        {
            return Ok(cached);
        }
        self.check_rev(rev)?;
        let path = self.layout.rev(rev);
        let file: RevisionFile = revfile::read(REV_MAGIC, &path)?
            .ok_or_else(|| FsError::Corrupt(format!("revision file '{}' is missing", path.display())))?;
        if file.rev != rev {
            return Err(FsError::Corrupt(format!(
                "'{}' holds revision {}",
                path.display(),
                file.rev
            )));
        }
        let file = Arc::new(file);
        self.revisions
            .write()
            .map_err(poisoned)?
            .insert(rev, Arc::clone(&file));
        Ok(file)
    }

    /// Remember a revision just written by a commit.
    pub fn cache_revision(&self, file: Arc<RevisionFile>) -> FsResult<()> {
        self.revisions.write().map_err(poisoned)?.insert(file.rev, file);
        Ok(())
    }

    /// A committed node-revision.
    pub fn node(&self, id: &FlatId) -> FsResult<NodeRev> {
        let rev = id
            .rev()
            .ok_or_else(|| FsError::Corrupt(format!("node '{id}' is not committed")))?;
        self.revision(rev)?
            .nodes
            .get(&id.key())
            .cloned()
            .ok_or_else(|| FsError::Corrupt(format!("revision {rev} has no node '{id}'")))
    }

    // ------------------------------------------------------------------
    // Revision properties and UUID
    // ------------------------------------------------------------------

    pub fn revprops(&self, rev: Revnum) -> FsResult<PropMap> {
        self.check_rev(rev)?;
        let path = self.layout.revprops(rev);
        match layout::read_optional(&path)? {
            Some(data) => serde_json::from_slice(&data).map_err(|e| {
                FsError::Corrupt(format!("revision properties '{}': {e}", path.display()))
            }),
            None => Ok(PropMap::new()),
        }
    }

    /// Replace the properties of `rev`. Caller holds the write lock.
    pub fn set_revprops(&self, rev: Revnum, props: &PropMap) -> FsResult<()> {
        Ok(write_revprops(&self.layout, rev, props, self.fsync)?)
    }

    pub fn uuid(&self) -> FsResult<String> {
        Ok(layout::read_string(&self.layout.uuid())?.trim().to_string())
    }

    pub fn set_uuid(&self, uuid: &str) -> FsResult<()> {
        let _guard = self.lock_writes()?;
        layout::write_atomic(&self.layout.uuid(), format!("{uuid}\n").as_bytes(), self.fsync)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// A fresh transaction name based on `base`. Caller holds the write lock.
    pub fn next_txn_name(&self, base: Revnum) -> FsResult<String> {
        let path = self.layout.txn_current();
        let text = layout::read_string(&path)?;
        let seq: u64 = text.trim().parse().map_err(|_| FlatError::Damaged {
            path: path.clone(),
            reason: format!("bad transaction counter '{}'", text.trim()),
        })?;
        let seq = seq + 1;
        layout::write_atomic(&path, format!("{seq}\n").as_bytes(), self.fsync)?;
        Ok(format!("{base}-{seq}"))
    }

    /// Path of transaction `name`. Only names of the `<rev>-<seq>` shape
    /// [`Repo::next_txn_name`] hands out are accepted.
    fn txn_path(&self, name: &str) -> FsResult<PathBuf> {
        if !is_txn_name(name) {
            return Err(FsError::NoSuchTransaction(name.to_string()));
        }
        Ok(self.layout.txn(name))
    }

    pub fn load_txn(&self, name: &str) -> FsResult<TxnState> {
        revfile::read(TXN_MAGIC, &self.txn_path(name)?)?
            .ok_or_else(|| FsError::NoSuchTransaction(name.to_string()))
    }

    pub fn save_txn(&self, state: &TxnState) -> FsResult<()> {
        Ok(revfile::write(TXN_MAGIC, state, &self.txn_path(&state.name)?, self.fsync)?)
    }

    pub fn remove_txn(&self, name: &str) -> FsResult<()> {
        let _guard = self.txn_lock.lock().map_err(poisoned)?;
        self.delete_txn_file(name)
    }

    /// Remove a transaction file. Caller holds the transaction lock.
    pub fn delete_txn_file(&self, name: &str) -> FsResult<()> {
        let path = self.txn_path(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FsError::NoSuchTransaction(name.to_string()))
            }
            Err(e) => Err(FlatError::io(&path, e).into()),
        }
    }

    /// Names of every transaction file, whether or not it is readable.
    pub fn txn_names(&self) -> FsResult<Vec<String>> {
        let dir = self.layout.txns_dir();
        let entries = fs::read_dir(&dir).map_err(|e| FlatError::io(&dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FlatError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TXN_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with(layout::TMP_PREFIX) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Run `f` on a snapshot of transaction `name`.
    pub fn with_txn<R>(&self, name: &str, f: impl FnOnce(&TxnState) -> FsResult<R>) -> FsResult<R> {
        let state = {
            let _guard = self.txn_lock.lock().map_err(poisoned)?;
            self.load_txn(name)?
        };
        f(&state)
    }

    /// Run `f` on transaction `name` and persist its changes if it succeeds.
    /// On failure the transaction file is left as it was.
    pub fn with_txn_mut<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut TxnState) -> FsResult<R>,
    ) -> FsResult<R> {
        let _guard = self.txn_lock.lock().map_err(poisoned)?;
        let mut state = self.load_txn(name)?;
        let out = f(&mut state)?;
        self.save_txn(&state)?;
        Ok(out)
    }

    /// Lock the transaction files for the duration of a commit.
    pub fn lock_txns(&self) -> FsResult<MutexGuard<'_, ()>> {
        self.txn_lock.lock().map_err(poisoned)
    }

    // ------------------------------------------------------------------
    // Lock table
    // ------------------------------------------------------------------

    pub fn load_locks(&self) -> FsResult<LockTable> {
        let path = self.layout.locks();
        match layout::read_optional(&path)? {
            Some(data) => serde_json::from_slice(&data)
                .map_err(|e| FsError::Corrupt(format!("lock table '{}': {e}", path.display()))),
            None => Ok(LockTable::new()),
        }
    }

    pub fn save_locks(&self, table: &LockTable) -> FsResult<()> {
        let path = self.layout.locks();
        let data = serde_json::to_vec_pretty(table)
            .map_err(|e| FsError::Serialization(e.to_string()))?;
        layout::write_atomic(&path, &data, self.fsync)?;
        Ok(())
    }
}

pub fn write_revprops(layout: &Layout, rev: Revnum, props: &PropMap, fsync: bool) -> FlatResult<()> {
    let path = layout.revprops(rev);
    let data = serde_json::to_vec(props).map_err(|e| FlatError::Encode {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    layout::write_atomic(&path, &data, fsync)
}

fn is_txn_name(name: &str) -> bool {
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    match name.split_once('-') {
        Some((rev, seq)) => digits(rev) && digits(seq),
        None => false,
    }
}
