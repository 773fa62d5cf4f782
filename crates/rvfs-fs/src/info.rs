//! Per-path metadata reports built from the read-only operations.
//!
//! This is the shape consumed by front-ends that show "info"-style output:
//! node kind and size, the revision that last changed the node with its
//! author and date, and any lock on the path.

use chrono::{DateTime, Utc};
use rvfs_types::{path, Lock, NodeKind, Revnum, PROP_REVISION_AUTHOR, PROP_REVISION_DATE};
use serde::{Deserialize, Serialize};

use crate::error::{FsError, FsResult};
use crate::fs::Filesystem;
use crate::root::Root;

/// How far below the starting path to report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
    /// Only the path itself.
    #[default]
    Empty,
    /// The path and everything below it.
    Infinity,
}

/// Metadata of one path in one revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub path: String,
    pub revision: Revnum,
    pub kind: NodeKind,
    /// File length; `None` for directories.
    pub size: Option<u64>,
    pub last_changed_rev: Option<Revnum>,
    pub last_changed_date: Option<DateTime<Utc>>,
    pub last_changed_author: Option<String>,
    pub lock: Option<Lock>,
    pub fs_uuid: String,
}

/// Report `path` in the revision root `root`, and with
/// [`Depth::Infinity`] everything below it, to `receiver`.
///
/// Entries are visited parent first, children in name order. The handle's
/// cancellation check is polled before each entry.
pub fn path_info<F>(
    fs: &Filesystem,
    root: &Root,
    path: &str,
    depth: Depth,
    mut receiver: F,
) -> FsResult<()>
where
    F: FnMut(PathInfo) -> FsResult<()>,
{
    let Some(revision) = root.revision() else {
        return Err(FsError::NotRevisionRoot { operation: "path info" });
    };
    let path = path::canonicalize(path);
    let uuid = fs.get_uuid()?;

    fs.context().check_cancelled()?;
    let kind = match path::split(&path) {
        // The root has no parent listing to take its entry from.
        None => root.check_path(&path)?,
        Some((parent, name)) => {
            if root.check_path(&parent)? != NodeKind::Dir {
                return Err(FsError::NotFound(path));
            }
            match root.dir_entries(&parent)?.get(&name) {
                Some(entry) => entry.kind,
                None => return Err(FsError::NotFound(path)),
            }
        }
    };
    if !kind.exists() {
        return Err(FsError::NotFound(path));
    }

    let walker = Walker {
        fs,
        root,
        revision,
        uuid,
        depth,
    };
    walker.visit(&path, kind, &mut receiver)
}

struct Walker<'a> {
    fs: &'a Filesystem,
    root: &'a Root,
    revision: Revnum,
    uuid: String,
    depth: Depth,
}

impl Walker<'_> {
    fn visit(
        &self,
        path: &str,
        kind: NodeKind,
        receiver: &mut dyn FnMut(PathInfo) -> FsResult<()>,
    ) -> FsResult<()> {
        receiver(self.build(path, kind)?)?;
        if kind != NodeKind::Dir || self.depth != Depth::Infinity {
            return Ok(());
        }
        for (name, entry) in self.root.dir_entries(path)? {
            self.fs.context().check_cancelled()?;
            self.visit(&path::join(path, &name), entry.kind, receiver)?;
        }
        Ok(())
    }

    fn build(&self, path: &str, kind: NodeKind) -> FsResult<PathInfo> {
        let size = match kind {
            NodeKind::File => Some(self.root.file_length(path)?),
            _ => None,
        };
        let last_changed_rev = self.root.node_created_rev(path)?;
        let (last_changed_date, last_changed_author) = match last_changed_rev {
            Some(rev) => (self.date(rev)?, self.author(rev)?),
            None => (None, None),
        };
        Ok(PathInfo {
            path: path.to_string(),
            revision: self.revision,
            kind,
            size,
            last_changed_rev,
            last_changed_date,
            last_changed_author,
            lock: self.lock(path)?,
            fs_uuid: self.uuid.clone(),
        })
    }

    fn author(&self, rev: Revnum) -> FsResult<Option<String>> {
        Ok(self
            .fs
            .revision_prop(rev, PROP_REVISION_AUTHOR)?
            .map(|raw| String::from_utf8_lossy(&raw).into_owned()))
    }

    fn date(&self, rev: Revnum) -> FsResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.fs.revision_prop(rev, PROP_REVISION_DATE)? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&raw);
        DateTime::parse_from_rfc3339(&text)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| FsError::Corrupt(format!("bad date on revision {rev}: {e}")))
    }

    fn lock(&self, path: &str) -> FsResult<Option<Lock>> {
        match self.fs.get_lock(path) {
            Err(FsError::NotImplemented(_)) => Ok(None),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{mock_fs, state_of};
    use crate::{FsAccess, LockRequest, TxnFlags};
    use rvfs_types::RevisionSpec;
    use std::sync::Arc;

    fn populated() -> (tempfile::TempDir, Filesystem) {
        let (dir, fs) = mock_fs();
        fs.set_access(Some(FsAccess::new("alice")));
        let txn = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE).unwrap();
        txn.change_prop(PROP_REVISION_AUTHOR, Some(b"alice")).unwrap();
        let root = txn.root().unwrap();
        root.make_dir("/d").unwrap();
        root.make_file("/d/b").unwrap();
        root.apply_text("/d/b", b"12345", None).unwrap();
        root.make_file("/d/a").unwrap();
        txn.commit().unwrap();
        (dir, fs)
    }

    fn collect(fs: &Filesystem, path: &str, depth: Depth) -> FsResult<Vec<PathInfo>> {
        let root = fs.revision_root(RevisionSpec::Youngest)?;
        let mut out = Vec::new();
        path_info(fs, &root, path, depth, |info| {
            out.push(info);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn single_file_report() {
        let (_dir, fs) = populated();
        fs.lock(LockRequest::new("/d/b")).unwrap();
        let infos = collect(&fs, "/d/b", Depth::Empty).unwrap();
        assert_eq!(infos.len(), 1);
        let info = &infos[0];
        assert_eq!(info.kind, NodeKind::File);
        assert_eq!(info.size, Some(5));
        assert_eq!(info.last_changed_rev, Some(Revnum::new(1)));
        assert_eq!(info.last_changed_author.as_deref(), Some("alice"));
        assert!(info.last_changed_date.is_some());
        assert_eq!(info.lock.as_ref().map(|l| l.path.as_str()), Some("/d/b"));
        assert_eq!(info.fs_uuid, fs.get_uuid().unwrap());
    }

    #[test]
    fn recursive_report_is_parent_first_in_name_order() {
        let (_dir, fs) = populated();
        let paths: Vec<_> = collect(&fs, "/", Depth::Infinity)
            .unwrap()
            .into_iter()
            .map(|i| i.path)
            .collect();
        assert_eq!(paths, ["/", "/d", "/d/a", "/d/b"]);
    }

    #[test]
    fn root_is_reported_without_a_parent() {
        let (_dir, fs) = populated();
        let infos = collect(&fs, "/", Depth::Empty).unwrap();
        assert_eq!(infos[0].kind, NodeKind::Dir);
        assert_eq!(infos[0].size, None);
    }

    #[test]
    fn missing_lock_support_degrades_to_no_lock() {
        let (_dir, fs) = populated();
        state_of(&fs).lock().unwrap().lock_not_implemented = true;
        let infos = collect(&fs, "/d/a", Depth::Empty).unwrap();
        assert_eq!(infos[0].lock, None);
    }

    #[test]
    fn missing_path_is_not_found() {
        let (_dir, fs) = populated();
        assert!(matches!(
            collect(&fs, "/d/zz", Depth::Empty),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            collect(&fs, "/d/a/deeper", Depth::Empty),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn cancellation_stops_the_walk() {
        let (_dir, fs) = populated();
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        fs.set_cancel(Some({
            let seen = Arc::clone(&seen);
            Arc::new(move || seen.load(std::sync::atomic::Ordering::SeqCst) >= 2)
        }));
        let root = fs.revision_root(RevisionSpec::Youngest).unwrap();
        let result = path_info(&fs, &root, "/", Depth::Infinity, |_| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        });
        assert!(matches!(result, Err(FsError::Cancelled)));
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn transaction_roots_are_refused() {
        let (_dir, fs) = populated();
        let txn = fs.begin_txn(RevisionSpec::Youngest, TxnFlags::NONE).unwrap();
        let root = txn.root().unwrap();
        let result = path_info(&fs, &root, "/", Depth::Empty, |_| Ok(()));
        assert!(matches!(result, Err(FsError::NotRevisionRoot { .. })));
    }
}
