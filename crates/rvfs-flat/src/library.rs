//! The flat backend's library object: create, open, and the operations that
//! work on a storage path without a handle.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rvfs_fs::context::{self, CancelFunc};
use rvfs_fs::init::shared_scope;
use rvfs_fs::{FsBackend, FsContext, FsError, FsLibrary, FsResult, NodeIdBackend};
use rvfs_types::{PropMap, Revnum, Version};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::FlatError;
use crate::fs::FlatFs;
use crate::id;
use crate::layout::{self, Layout, CURRENT_FILE, TMP_PREFIX, TXNS_DIR};
use crate::repo::{self, Repo};
use crate::revfile::{self, RevisionFile, REV_MAGIC};
use crate::CONFIG_FSYNC;

pub struct FlatLibrary {
    version: Version,
}

impl FlatLibrary {
    pub fn new(version: Version) -> Self {
        Self { version }
    }
}

/// The live shared state for `path`, if some handle in this process has it
/// open.
fn live_repo(path: &Path) -> Option<Arc<Repo>> {
    shared_scope().get::<Repo>(&repo::scope_key(path))
}

fn is_tmp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TMP_PREFIX))
}

impl FsLibrary for FlatLibrary {
    fn version(&self) -> Version {
        self.version
    }

    fn description(&self) -> &str {
        "Module for working with a flat-file repository."
    }

    fn create(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>> {
        let fsync = ctx.config().get_bool(CONFIG_FSYNC, false)?;
        Repo::create(path, fsync)?;
        Ok(Box::new(FlatFs::new(path, ctx)))
    }

    fn open(&self, path: &Path, ctx: Arc<FsContext>) -> FsResult<Box<dyn FsBackend>> {
        // Fail here on a foreign or damaged layout, before the handle exists.
        Repo::open(path, false)?;
        Ok(Box::new(FlatFs::new(path, ctx)))
    }

    fn delete_fs(&self, path: &Path) -> FsResult<()> {
        let key = repo::scope_key(path);
        if shared_scope().remove(&key) {
            debug!(%key, "dropped shared repository state");
        }
        fs::remove_dir_all(path).map_err(|e| FlatError::io(path, e))?;
        Ok(())
    }

    /// Copy every file under `src`, writing `current` last so the copy
    /// never names a revision it lacks. Commits on a live repository are
    /// held off for the duration.
    fn hotcopy(&self, src: &Path, dest: &Path, clean: bool) -> FsResult<()> {
        if dest.exists() && fs::read_dir(dest).map_err(|e| FlatError::io(dest, e))?.next().is_some() {
            return Err(FsError::AlreadyExists(dest.display().to_string()));
        }
        Repo::open(src, false)?;
        let live = live_repo(src);
        let _guard = live.as_ref().map(|r| r.lock_writes()).transpose()?;

        let txns = src.join(TXNS_DIR);
        let mut copied = 0usize;
        for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| FsError::Io(e.into()))?;
            let from = entry.path();
            let rel = from.strip_prefix(src).map_err(|e| FsError::Internal(e.to_string()))?;
            let to = dest.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&to).map_err(|e| FlatError::io(&to, e))?;
                continue;
            }
            if is_tmp(from) || rel == Path::new(CURRENT_FILE) {
                continue;
            }
            if clean && from.starts_with(&txns) {
                continue;
            }
            fs::copy(from, &to).map_err(|e| FlatError::io(&to, e))?;
            copied += 1;
        }
        let current = dest.join(CURRENT_FILE);
        fs::copy(src.join(CURRENT_FILE), &current).map_err(|e| FlatError::io(&current, e))?;
        debug!(src = %src.display(), dest = %dest.display(), files = copied + 1, clean, "copied flat repository");
        Ok(())
    }

    /// Rebuild `current` from the revision files actually on disk, fill in
    /// missing revision properties, and drop leftovers of interrupted
    /// writes.
    fn recover(&self, path: &Path, cancel: Option<&CancelFunc>) -> FsResult<()> {
        Repo::open(path, false)?;
        let live = live_repo(path);
        let _guard = live.as_ref().map(|r| r.lock_writes()).transpose()?;
        let layout = Layout::new(path);

        let mut last: Option<RevisionFile> = None;
        let mut rev = Revnum::ZERO;
        loop {
            context::check(cancel)?;
            let file_path = layout.rev(rev);
            match revfile::read::<RevisionFile>(REV_MAGIC, &file_path) {
                Ok(Some(file)) if file.rev == rev => {
                    if layout::read_optional(&layout.revprops(rev))?.is_none() {
                        warn!(%rev, "revision properties missing; writing an empty set");
                        repo::write_revprops(&layout, rev, &PropMap::new(), true)?;
                    }
                    last = Some(file);
                    rev = rev.next();
                }
                Ok(None) => break,
                Ok(Some(_)) | Err(_) if rev == Revnum::ZERO => {
                    return Err(FsError::Corrupt(format!(
                        "revision 0 at '{}' is unreadable",
                        file_path.display()
                    )));
                }
                Ok(Some(_)) | Err(_) => {
                    warn!(%rev, path = %file_path.display(), "removing partial revision file");
                    fs::remove_file(&file_path).map_err(|e| FlatError::io(&file_path, e))?;
                    break;
                }
            }
        }
        let Some(last) = last else {
            return Err(FsError::Corrupt(format!("no revision 0 under '{}'", path.display())));
        };
        last.counters().write(&layout, true)?;

        let mut removed = 0usize;
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|e| FsError::Io(e.into()))?;
            if entry.file_type().is_file() && is_tmp(entry.path()) {
                fs::remove_file(entry.path()).map_err(|e| FlatError::io(entry.path(), e))?;
                removed += 1;
            }
        }
        info!(path = %path.display(), youngest = %last.rev, removed, "recovered flat repository");
        Ok(())
    }

    fn parse_id(&self, data: &[u8]) -> FsResult<Arc<dyn NodeIdBackend>> {
        Ok(Arc::new(id::parse(data)?))
    }
}
